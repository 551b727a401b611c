// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

mod app;
mod config;
mod device;
mod hid;
mod localize;
mod panel;
mod presenter;
mod registry;
mod upower;

pub use config::{APP_ID, VERSION};

use crate::localize::localize;

pub fn run() -> cosmic::iced::Result {
    localize();
    app::run()
}
