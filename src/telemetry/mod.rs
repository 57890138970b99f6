// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing setup.
//!
//! Diagnostics use `tracing` throughout the crate; the run log in
//! [`crate::runlog`] is a separate, machine-readable record of tool calls.
//!
//! ```rust,ignore
//! use conductor::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
