// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

pub const APP_ID: &str = "com.system76.CosmicAppletWirelessHid";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
