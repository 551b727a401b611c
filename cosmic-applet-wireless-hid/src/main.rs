// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cosmic_applet_wireless_hid::{APP_ID, VERSION};

fn main() -> cosmic::iced::Result {
    let journald = tracing_journald::layer().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer())
        .with(journald)
        .init();
    let _ = tracing_log::LogTracer::init();

    tracing::info!("Wireless HID Applet ({})", APP_ID);
    tracing::info!("Version: {}", VERSION);

    cosmic_applet_wireless_hid::run()
}
