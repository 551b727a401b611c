// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::VecDeque;

use cosmic_applets_config::wireless_hid::{PanelBox, WirelessHidAppletConfig};

use crate::{
    device::Device,
    hid::{DeviceRow, HidEvent, TimerTicket},
    registry::Registry,
};

/// The on-screen element the presenter drives.
pub trait Indicator {
    fn set_visible(&mut self, visible: bool);

    /// Moves the indicator into `panel_box` at `index`.
    fn place(&mut self, panel_box: PanelBox, index: u32);
}

/// Keeps the displayed device rows and the indicator in sync with the registry.
pub struct Presenter<I> {
    config: WirelessHidAppletConfig,
    registry: Registry,
    indicator: I,
    enabled: bool,
}

impl<I: Indicator> Presenter<I> {
    pub fn new(config: WirelessHidAppletConfig, indicator: I) -> Self {
        Self {
            config,
            registry: Registry::default(),
            indicator,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &WirelessHidAppletConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Starts a fresh session. A running session is torn down first.
    pub fn enable(&mut self) {
        if self.enabled {
            self.disable();
        }
        tracing::info!("enabling wireless device tracking");
        self.enabled = true;
        self.update_panel_position();
        self.update_visibility();
    }

    /// Drops every wrapper. Pending timer tickets become stale.
    pub fn disable(&mut self) {
        if self.enabled {
            tracing::info!("disabling wireless device tracking");
        }
        self.enabled = false;
        let destroyed = self.registry.destroy_all();
        self.dispatch(destroyed);
        self.indicator.set_visible(false);
    }

    pub fn reconcile(&mut self, devices: Vec<Device>) -> Vec<TimerTicket> {
        if !self.enabled {
            return Vec::new();
        }

        let reconciled = self.registry.reconcile(devices);
        self.dispatch(reconciled.destroyed);

        let timeouts = reconciled
            .added
            .iter()
            .filter_map(|id| self.refresh(id))
            .collect();
        self.update_visibility();
        timeouts
    }

    pub fn device_changed(&mut self, device: Device) -> Option<TimerTicket> {
        if !self.enabled {
            return None;
        }
        let id = device.id().to_string();
        if self.registry.update_device(device) {
            self.refresh(&id)
        } else {
            None
        }
    }

    pub fn timeout(&mut self, ticket: &TimerTicket) {
        let Some(hid) = self.registry.get_mut(&ticket.device) else {
            return;
        };
        if let Some(event) = hid.on_timeout(ticket) {
            tracing::debug!(device = %ticket.device, "no update within {:?}", ticket.delay);
            self.dispatch(vec![(ticket.device.clone(), event)]);
        }
    }

    /// Applies new settings: re-places the indicator when the placement moved
    /// and re-evaluates every device.
    pub fn config_changed(&mut self, config: WirelessHidAppletConfig) -> Vec<TimerTicket> {
        let placement_changed = config.placement() != self.config.placement();
        self.config = config;

        if !self.enabled {
            return Vec::new();
        }
        if placement_changed {
            self.update_panel_position();
        }

        let ids: Vec<String> = self.registry.ids().map(str::to_string).collect();
        let timeouts = ids.iter().filter_map(|id| self.refresh(id)).collect();
        self.update_visibility();
        timeouts
    }

    pub fn update_visibility(&mut self) {
        let visible = self.enabled && self.registry.any_visible();
        self.indicator.set_visible(visible);
    }

    /// Leaves the applet where the panel put it until a placement is set.
    pub fn update_panel_position(&mut self) {
        if let Some((panel_box, index)) = self.config.placement() {
            self.indicator.place(panel_box, index);
        }
    }

    /// Displayed rows, ordered by name so the panel does not reshuffle.
    pub fn rows(&self) -> Vec<&DeviceRow> {
        let mut rows: Vec<(&str, &DeviceRow)> = self
            .registry
            .iter()
            .filter_map(|hid| hid.row().map(|row| (hid.id(), row)))
            .collect();
        rows.sort_by(|(a_id, a), (b_id, b)| a.name.cmp(&b.name).then_with(|| a_id.cmp(b_id)));
        rows.into_iter().map(|(_, row)| row).collect()
    }

    fn refresh(&mut self, id: &str) -> Option<TimerTicket> {
        let hid = self.registry.get_mut(id)?;
        let refresh = hid.refresh(&self.config);
        self.dispatch(refresh.events.into_iter().map(|e| (id.to_string(), e)).collect());
        refresh.timeout
    }

    fn dispatch(&mut self, events: Vec<(String, HidEvent)>) {
        let mut queue = VecDeque::from(events);
        while let Some((id, event)) = queue.pop_front() {
            match event {
                HidEvent::Show => {
                    let Some(hid) = self.registry.get_mut(&id) else {
                        continue;
                    };
                    if hid.row().is_none() {
                        hid.attach(&self.config);
                    }
                    // Not a refresh, the pending timeout must keep running
                    let follow_up = hid.update(&self.config);
                    queue.extend(follow_up.into_iter().map(|e| (id.clone(), e)));
                    self.update_visibility();
                }
                HidEvent::Hide => {
                    if let Some(hid) = self.registry.get_mut(&id) {
                        hid.detach();
                    }
                    self.update_visibility();
                }
                HidEvent::Destroy => self.update_visibility(),
                HidEvent::Update => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::tests::mouse;

    #[derive(Debug, Default)]
    struct RecordingIndicator {
        visible: bool,
        placements: Vec<(PanelBox, u32)>,
    }

    impl Indicator for RecordingIndicator {
        fn set_visible(&mut self, visible: bool) {
            self.visible = visible;
        }

        fn place(&mut self, panel_box: PanelBox, index: u32) {
            self.placements.push((panel_box, index));
        }
    }

    fn presenter(config: WirelessHidAppletConfig) -> Presenter<RecordingIndicator> {
        let mut presenter = Presenter::new(config, RecordingIndicator::default());
        presenter.enable();
        presenter
    }

    fn hidden(path: &str) -> Device {
        Device {
            is_present: false,
            ..mouse(path, 50.0)
        }
    }

    fn assert_rows_match_visibility(presenter: &Presenter<RecordingIndicator>) {
        for hid in presenter.registry().iter() {
            assert_eq!(hid.row().is_some(), hid.is_visible(), "{}", hid.id());
        }
    }

    #[test]
    fn no_devices_hides_the_indicator() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        presenter.reconcile(Vec::new());
        assert!(!presenter.indicator().visible);
    }

    #[test]
    fn one_visible_device_shows_the_indicator() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        presenter.reconcile(vec![hidden("/a"), mouse("/b", 40.0)]);

        assert!(presenter.indicator().visible);
        assert_eq!(presenter.rows().len(), 1);
        assert_rows_match_visibility(&presenter);
    }

    #[test]
    fn all_hidden_devices_hide_the_indicator() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        presenter.reconcile(vec![hidden("/a"), hidden("/b")]);

        assert!(!presenter.indicator().visible);
        assert!(presenter.rows().is_empty());
        assert_rows_match_visibility(&presenter);
    }

    #[test]
    fn device_changes_toggle_rows() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        presenter.reconcile(vec![mouse("/a", 40.0)]);
        assert!(presenter.indicator().visible);

        presenter.device_changed(hidden("/a"));
        assert!(!presenter.indicator().visible);
        assert_rows_match_visibility(&presenter);

        presenter.device_changed(mouse("/a", 35.0));
        assert!(presenter.indicator().visible);
        assert_eq!(presenter.rows()[0].label, "35%");
        assert_rows_match_visibility(&presenter);
    }

    #[test]
    fn removed_devices_release_their_rows() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        presenter.reconcile(vec![mouse("/a", 40.0), mouse("/b", 60.0)]);
        assert_eq!(presenter.rows().len(), 2);

        presenter.reconcile(vec![mouse("/b", 60.0)]);
        assert_eq!(presenter.rows().len(), 1);
        assert!(presenter.indicator().visible);

        presenter.reconcile(Vec::new());
        assert!(presenter.rows().is_empty());
        assert!(!presenter.indicator().visible);
    }

    #[test]
    fn silent_device_is_hidden_once() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            device_update_timeout: 5,
            ..Default::default()
        });
        let tickets = presenter.reconcile(vec![mouse("/a", 40.0)]);
        assert_eq!(tickets.len(), 1);
        assert!(presenter.indicator().visible);

        presenter.timeout(&tickets[0]);
        assert!(!presenter.indicator().visible);
        assert_rows_match_visibility(&presenter);

        // A duplicate delivery must not hide anything a second time
        presenter.timeout(&tickets[0]);
        assert!(!presenter.indicator().visible);
        assert!(!presenter.registry().get("/a").unwrap().has_pending_timeout());
    }

    #[test]
    fn update_before_timeout_keeps_device_shown() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            device_update_timeout: 5,
            ..Default::default()
        });
        let first = presenter.reconcile(vec![mouse("/a", 40.0)]).remove(0);
        let second = presenter.device_changed(mouse("/a", 39.0)).unwrap();

        presenter.timeout(&first);
        assert!(presenter.indicator().visible);

        presenter.timeout(&second);
        assert!(!presenter.indicator().visible);
    }

    #[test]
    fn hidden_by_timeout_comes_back_on_next_update() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            device_update_timeout: 5,
            ..Default::default()
        });
        let ticket = presenter.reconcile(vec![mouse("/a", 40.0)]).remove(0);
        presenter.timeout(&ticket);
        assert!(!presenter.indicator().visible);

        presenter.device_changed(mouse("/a", 40.0));
        assert!(presenter.indicator().visible);
        assert_rows_match_visibility(&presenter);
    }

    #[test]
    fn settings_change_reevaluates_devices_and_placement() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            hide_elan: false,
            ..Default::default()
        });
        let elan = Device {
            model: Some("ELAN Touchpad".to_string()),
            ..mouse("/elan", 100.0)
        };
        presenter.reconcile(vec![elan]);
        assert!(presenter.indicator().visible);

        presenter.config_changed(WirelessHidAppletConfig {
            hide_elan: true,
            panel_box: Some(PanelBox::Center),
            panel_box_index: Some(2),
            ..Default::default()
        });
        assert!(!presenter.indicator().visible);
        assert_eq!(
            presenter.indicator().placements.last(),
            Some(&(PanelBox::Center, 2))
        );
    }

    #[test]
    fn unset_placement_leaves_the_panel_alone() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        presenter.reconcile(vec![mouse("/a", 40.0)]);
        presenter.config_changed(WirelessHidAppletConfig {
            hide_elan: false,
            ..Default::default()
        });
        presenter.enable();

        assert!(presenter.indicator().placements.is_empty());
    }

    #[test]
    fn disabling_the_timeout_cancels_armed_timers() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            device_update_timeout: 5,
            ..Default::default()
        });
        let ticket = presenter.reconcile(vec![mouse("/a", 40.0)]).remove(0);
        assert!(presenter.registry().get("/a").unwrap().has_pending_timeout());

        let tickets = presenter.config_changed(WirelessHidAppletConfig {
            device_update_timeout: 0,
            ..Default::default()
        });
        assert!(tickets.is_empty());
        assert!(!presenter.registry().get("/a").unwrap().has_pending_timeout());

        presenter.timeout(&ticket);
        assert!(presenter.indicator().visible);
        assert_eq!(presenter.rows().len(), 1);
    }

    #[test]
    fn unchanged_placement_is_not_reapplied() {
        let placed = WirelessHidAppletConfig {
            panel_box: Some(PanelBox::Center),
            ..Default::default()
        };
        let mut presenter = presenter(placed.clone());
        assert_eq!(presenter.indicator().placements.len(), 1);

        presenter.config_changed(WirelessHidAppletConfig {
            highlight_charged_devices: true,
            ..placed
        });
        assert_eq!(presenter.indicator().placements.len(), 1);
    }

    #[test]
    fn disable_tears_everything_down() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            device_update_timeout: 5,
            ..Default::default()
        });
        let ticket = presenter.reconcile(vec![mouse("/a", 40.0)]).remove(0);

        presenter.disable();
        assert!(!presenter.is_enabled());
        assert!(presenter.registry().is_empty());
        assert!(!presenter.indicator().visible);

        // Late notifications after teardown are inert
        presenter.timeout(&ticket);
        assert!(presenter.device_changed(mouse("/a", 40.0)).is_none());
        assert!(presenter.reconcile(vec![mouse("/a", 40.0)]).is_empty());
        assert!(presenter.registry().is_empty());
    }

    #[test]
    fn disable_without_enable_is_harmless() {
        let mut presenter =
            Presenter::new(WirelessHidAppletConfig::default(), RecordingIndicator::default());
        presenter.disable();
        assert!(!presenter.indicator().visible);
    }

    #[test]
    fn enable_rebuilds_state() {
        let mut presenter = presenter(WirelessHidAppletConfig {
            panel_box: Some(PanelBox::Start),
            ..Default::default()
        });
        presenter.reconcile(vec![mouse("/a", 40.0)]);

        presenter.enable();
        assert!(presenter.registry().is_empty());
        assert!(!presenter.indicator().visible);

        presenter.reconcile(vec![mouse("/a", 40.0)]);
        assert!(presenter.indicator().visible);

        presenter.disable();
        presenter.enable();
        presenter.reconcile(vec![mouse("/a", 40.0)]);
        assert!(presenter.indicator().visible);
        assert_eq!(presenter.indicator().placements.len(), 3);
    }

    #[test]
    fn rows_are_sorted_by_name() {
        let mut presenter = presenter(WirelessHidAppletConfig::default());
        let keyboard = Device {
            model: Some("K380".to_string()),
            ..mouse("/z", 70.0)
        };
        let g305 = Device {
            model: Some("G305".to_string()),
            ..mouse("/a", 70.0)
        };
        presenter.reconcile(vec![keyboard, g305]);

        let names: Vec<_> = presenter
            .rows()
            .iter()
            .map(|row| row.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, ["G305", "K380"]);
    }
}
