// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use cosmic_config::{self, CosmicConfigEntry, cosmic_config_derive::CosmicConfigEntry};
use serde::{Deserialize, Serialize};

/// Section of the panel the applet is placed in.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum PanelBox {
    Start,
    Center,
    #[default]
    End,
}

impl PanelBox {
    pub const ALL: [PanelBox; 3] = [PanelBox::Start, PanelBox::Center, PanelBox::End];

    pub fn position(self) -> usize {
        Self::ALL.iter().position(|b| *b == self).unwrap_or_default()
    }

    pub fn from_position(position: usize) -> Option<Self> {
        Self::ALL.get(position).copied()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, CosmicConfigEntry)]
#[version = 1]
pub struct WirelessHidAppletConfig {
    /// Hide devices that report an unknown battery state. Some receivers
    /// claim to be present while no battery is attached.
    pub hide_unknown_battery_state: bool,
    /// Hide devices from vendors known to report bogus batteries.
    pub hide_elan: bool,
    /// Color by the warning level the device reports instead of fixed
    /// percentage thresholds.
    pub use_device_levels: bool,
    pub highlight_charged_devices: bool,
    /// Seconds without an update before a device is assumed gone. 0 disables.
    pub device_update_timeout: u32,
    /// Unset until chosen in the popup. The applet is only moved once either
    /// key is set.
    pub panel_box: Option<PanelBox>,
    pub panel_box_index: Option<u32>,
}

impl Default for WirelessHidAppletConfig {
    fn default() -> Self {
        Self {
            hide_unknown_battery_state: false,
            hide_elan: true,
            use_device_levels: false,
            highlight_charged_devices: false,
            device_update_timeout: 0,
            panel_box: None,
            panel_box_index: None,
        }
    }
}

impl WirelessHidAppletConfig {
    pub fn device_timeout(&self) -> Option<Duration> {
        (self.device_update_timeout != 0)
            .then(|| Duration::from_secs(u64::from(self.device_update_timeout)))
    }

    /// Where the user asked for the applet to go, if anywhere.
    pub fn placement(&self) -> Option<(PanelBox, u32)> {
        if self.panel_box.is_none() && self.panel_box_index.is_none() {
            return None;
        }
        Some((
            self.panel_box.unwrap_or_default(),
            self.panel_box_index.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_inactivity_tracking() {
        let mut config = WirelessHidAppletConfig::default();
        assert_eq!(config.device_timeout(), None);

        config.device_update_timeout = 5;
        assert_eq!(config.device_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn placement_is_unset_until_configured() {
        let mut config = WirelessHidAppletConfig::default();
        assert_eq!(config.placement(), None);

        config.panel_box_index = Some(2);
        assert_eq!(config.placement(), Some((PanelBox::End, 2)));

        config.panel_box = Some(PanelBox::Start);
        assert_eq!(config.placement(), Some((PanelBox::Start, 2)));
    }

    #[test]
    fn panel_box_positions_match_dropdown_order() {
        for (i, panel_box) in PanelBox::ALL.iter().enumerate() {
            assert_eq!(panel_box.position(), i);
            assert_eq!(PanelBox::from_position(i), Some(*panel_box));
        }
        assert_eq!(PanelBox::from_position(3), None);
    }
}
