// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use cosmic_applets_config::wireless_hid::WirelessHidAppletConfig;

use crate::device::{Device, DeviceKind, DeviceState, WarningLevel};

/// Model prefixes of devices known to report a battery they do not have.
const BOGUS_BATTERY_MODELS: &[&str] = &["ELAN"];

/// Events raised by a [`HidDevice`] for the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidEvent {
    Show,
    Hide,
    Update,
    Destroy,
}

/// Color overlay for a device icon and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelColor {
    Low,
    Critical,
    Charged,
}

impl LevelColor {
    pub fn rgb8(self) -> [u8; 3] {
        match self {
            LevelColor::Critical => [255, 0, 0],
            LevelColor::Low => [255, 165, 0],
            LevelColor::Charged => [51, 209, 122],
        }
    }
}

pub fn should_be_visible(device: &Device, config: &WirelessHidAppletConfig) -> bool {
    if !device.is_present {
        return false;
    }

    let Some(model) = device.model_name() else {
        return false;
    };

    if device.kind == DeviceKind::Battery {
        return false;
    }

    if config.hide_unknown_battery_state && device.state == DeviceState::Unknown {
        return false;
    }

    if config.hide_elan
        && BOGUS_BATTERY_MODELS
            .iter()
            .any(|prefix| model.starts_with(prefix))
    {
        return false;
    }

    true
}

pub fn level_color(device: &Device, config: &WirelessHidAppletConfig) -> Option<LevelColor> {
    if config.highlight_charged_devices && device.state == DeviceState::FullyCharged {
        return Some(LevelColor::Charged);
    }

    if config.use_device_levels {
        return match device.warning_level {
            WarningLevel::Critical | WarningLevel::Action => Some(LevelColor::Critical),
            WarningLevel::Low => Some(LevelColor::Low),
            _ => None,
        };
    }

    match device.percentage? {
        p if p <= 10.0 => Some(LevelColor::Critical),
        p if p <= 30.0 => Some(LevelColor::Low),
        _ => None,
    }
}

pub fn icon_name(device: &Device) -> &'static str {
    // Some receivers report every paired device as a keyboard
    if let Some(model) = device.model.as_deref() {
        if model.contains("Mouse") {
            return "input-mouse-symbolic";
        } else if model.contains("Controller") {
            return "input-gaming-symbolic";
        } else if model.contains("Headset") {
            return "audio-headset-symbolic";
        }
    }

    match device.kind {
        DeviceKind::BluetoothGeneric => "bluetooth-active-symbolic",
        DeviceKind::Camera => "camera-photo-symbolic",
        DeviceKind::Computer => "computer-symbolic",
        DeviceKind::GamingInput => "input-gaming-symbolic",
        DeviceKind::Headphones => "audio-headphones-symbolic",
        DeviceKind::Headset => "audio-headset-symbolic",
        DeviceKind::Keyboard => "input-keyboard-symbolic",
        DeviceKind::LinePower => "battery-full-charged-symbolic",
        DeviceKind::MediaPlayer => "multimedia-player-symbolic",
        DeviceKind::Modem => "modem-symbolic",
        DeviceKind::Monitor => "video-display-symbolic",
        DeviceKind::Mouse => "input-mouse-symbolic",
        DeviceKind::Network => "network-workgroup-symbolic",
        DeviceKind::OtherAudio => "audio-card-symbolic",
        DeviceKind::Pda => "pda-symbolic",
        DeviceKind::Pen => "document-edit-symbolic",
        DeviceKind::Phone => "phone-symbolic",
        DeviceKind::Printer => "printer-symbolic",
        DeviceKind::RemoteControl => "accessories-calculator-symbolic",
        DeviceKind::Scanner => "scanner-symbolic",
        DeviceKind::Speakers => "audio-speakers-symbolic",
        DeviceKind::Tablet => "input-tablet-symbolic",
        DeviceKind::Touchpad => "input-touchpad-symbolic",
        DeviceKind::Toy => "applications-games-symbolic",
        DeviceKind::Ups => "uninterruptible-power-supply-symbolic",
        DeviceKind::Video => "camera-video-symbolic",
        DeviceKind::Battery | DeviceKind::Wearable | DeviceKind::Unknown => "battery-symbolic",
    }
}

pub fn percentage_label(device: &Device) -> String {
    match device.percentage {
        Some(p) => format!("{:.0}%", p.clamp(0.0, 100.0)),
        None => "--%".to_string(),
    }
}

/// What the panel shows for a visible device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow {
    pub icon_name: &'static str,
    pub name: Option<String>,
    pub label: String,
    pub color: Option<LevelColor>,
}

/// Identifies one arming of a device's inactivity timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerTicket {
    pub device: String,
    pub serial: u64,
    pub generation: u64,
    pub delay: Duration,
}

#[derive(Debug, Default)]
struct InactivityTimer {
    generation: u64,
    armed: Option<u64>,
}

impl InactivityTimer {
    fn arm(&mut self) -> u64 {
        self.generation += 1;
        self.armed = Some(self.generation);
        self.generation
    }

    fn cancel(&mut self) {
        self.armed = None;
    }

    /// Consumes the armed generation if it matches.
    fn fire(&mut self, generation: u64) -> bool {
        if self.armed == Some(generation) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct Refresh {
    pub events: Vec<HidEvent>,
    pub timeout: Option<TimerTicket>,
}

/// A UPower device tracked by the applet.
#[derive(Debug)]
pub struct HidDevice {
    device: Device,
    serial: u64,
    visible: bool,
    row: Option<DeviceRow>,
    timer: InactivityTimer,
}

impl HidDevice {
    pub fn new(device: Device, serial: u64) -> Self {
        Self {
            device,
            serial,
            visible: false,
            row: None,
            timer: InactivityTimer::default(),
        }
    }

    pub fn id(&self) -> &str {
        self.device.id()
    }

    #[cfg(test)]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[cfg(test)]
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn set_device(&mut self, device: Device) {
        self.device = device;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn row(&self) -> Option<&DeviceRow> {
        self.row.as_ref()
    }

    pub fn has_pending_timeout(&self) -> bool {
        self.timer.armed.is_some()
    }

    /// Re-arms the inactivity timer and recomputes the device state.
    pub fn refresh(&mut self, config: &WirelessHidAppletConfig) -> Refresh {
        self.timer.cancel();

        let timeout = config.device_timeout().map(|delay| TimerTicket {
            device: self.id().to_string(),
            serial: self.serial,
            generation: self.timer.arm(),
            delay,
        });

        Refresh {
            events: self.update(config),
            timeout,
        }
    }

    /// Recomputes the label, color and visibility without touching the timer.
    pub fn update(&mut self, config: &WirelessHidAppletConfig) -> Vec<HidEvent> {
        let label = percentage_label(&self.device);
        let color = level_color(&self.device, config);
        if let Some(row) = self.row.as_mut() {
            row.label = label;
            row.color = color;
        }

        let mut events = Vec::with_capacity(2);
        let should_be_visible = should_be_visible(&self.device, config);
        if should_be_visible && !self.visible {
            events.push(HidEvent::Show);
        } else if !should_be_visible && self.visible {
            events.push(HidEvent::Hide);
        }
        events.push(HidEvent::Update);
        events
    }

    pub fn on_timeout(&mut self, ticket: &TimerTicket) -> Option<HidEvent> {
        (ticket.serial == self.serial && self.timer.fire(ticket.generation))
            .then_some(HidEvent::Hide)
    }

    /// Creates the displayed row. The device counts as visible from now on.
    pub fn attach(&mut self, config: &WirelessHidAppletConfig) {
        self.row = Some(DeviceRow {
            icon_name: icon_name(&self.device),
            name: self.device.model.clone(),
            label: percentage_label(&self.device),
            color: level_color(&self.device, config),
        });
        self.visible = true;
    }

    /// Releases the displayed row.
    pub fn detach(&mut self) {
        self.row = None;
        self.visible = false;
    }

    pub fn destroy(mut self) -> HidEvent {
        self.timer.cancel();
        if self.visible {
            self.detach();
        }
        HidEvent::Destroy
    }
}
