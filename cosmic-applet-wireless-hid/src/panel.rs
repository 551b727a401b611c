// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Context;
use cosmic::{
    applet::cosmic_panel_config::CosmicPanelConfig,
    cosmic_config::{Config, CosmicConfigEntry},
};
use cosmic_applets_config::wireless_hid::PanelBox;

use crate::presenter::Indicator;

const PANEL_CONFIG_PREFIX: &str = "com.system76.CosmicPanel";

/// Applet lists of one COSMIC panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelLayout {
    pub start: Vec<String>,
    pub center: Vec<String>,
    pub end: Vec<String>,
}

impl PanelLayout {
    pub fn from_panel(panel: &CosmicPanelConfig) -> Self {
        let (start, end) = panel.plugins_wings.clone().unwrap_or_default();

        Self {
            start,
            center: panel.plugins_center.clone().unwrap_or_default(),
            end,
        }
    }

    /// Writes the lists back through the panel config setters.
    pub fn store(self, panel: &mut CosmicPanelConfig, config: &Config) -> anyhow::Result<()> {
        panel
            .set_plugins_wings(config, Some((self.start, self.end)))
            .context("writing plugins_wings")?;
        panel
            .set_plugins_center(config, Some(self.center))
            .context("writing plugins_center")?;
        Ok(())
    }

    pub fn position(&self, applet: &str) -> Option<(PanelBox, usize)> {
        PanelBox::ALL.into_iter().find_map(|panel_box| {
            self.section(panel_box)
                .iter()
                .position(|id| id == applet)
                .map(|index| (panel_box, index))
        })
    }

    /// Moves `applet` into `panel_box` at `index`, clamped to the end of the
    /// section. Applets missing from this panel are left alone.
    ///
    /// Returns whether the layout changed.
    pub fn place(&mut self, applet: &str, panel_box: PanelBox, index: usize) -> bool {
        let Some(current) = self.position(applet) else {
            return false;
        };

        for section in [&mut self.start, &mut self.center, &mut self.end] {
            section.retain(|id| id != applet);
        }
        let section = self.section_mut(panel_box);
        let index = index.min(section.len());
        section.insert(index, applet.to_string());

        current != (panel_box, index)
    }

    fn section(&self, panel_box: PanelBox) -> &Vec<String> {
        match panel_box {
            PanelBox::Start => &self.start,
            PanelBox::Center => &self.center,
            PanelBox::End => &self.end,
        }
    }

    fn section_mut(&mut self, panel_box: PanelBox) -> &mut Vec<String> {
        match panel_box {
            PanelBox::Start => &mut self.start,
            PanelBox::Center => &mut self.center,
            PanelBox::End => &mut self.end,
        }
    }
}

/// The applet's button in the COSMIC panel.
pub struct PanelIndicator {
    applet_id: &'static str,
    visible: bool,
    panel_config: Option<Config>,
}

impl PanelIndicator {
    /// `panel` is the name of the panel hosting the applet, such as `Panel`
    /// or `Dock`.
    pub fn new(applet_id: &'static str, panel: &str) -> Self {
        let panel_config = match Config::new(
            &format!("{PANEL_CONFIG_PREFIX}.{panel}"),
            CosmicPanelConfig::VERSION,
        ) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(?err, %panel, "panel configuration unavailable");
                None
            }
        };

        Self {
            applet_id,
            visible: false,
            panel_config,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Indicator for PanelIndicator {
    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn place(&mut self, panel_box: PanelBox, index: u32) {
        let Some(config) = self.panel_config.as_ref() else {
            return;
        };

        // Keys that fail to load come back as defaults. An unreadable list
        // does not contain the applet, so nothing gets written.
        let mut panel = CosmicPanelConfig::get_entry(config).unwrap_or_else(|(errors, panel)| {
            for err in errors {
                tracing::debug!(?err, "Error reading panel config");
            }
            panel
        });

        let mut layout = PanelLayout::from_panel(&panel);
        if !layout.place(self.applet_id, panel_box, index as usize) {
            return;
        }
        tracing::info!(?panel_box, index, "moving applet in panel");
        if let Err(err) = layout.store(&mut panel, config) {
            tracing::error!("Failed to place applet in panel: {err:#}");
        }
    }
}
