// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    config::APP_ID,
    fl,
    hid::{DeviceRow, LevelColor, TimerTicket},
    panel::PanelIndicator,
    presenter::Presenter,
    upower::{DeviceEvent, UpowerEvent, device_subscription, upower_subscription},
};
use cosmic::{
    Element, Task, app,
    applet::{cosmic_panel_config::PanelAnchor, padded_control},
    cosmic_theme::Spacing,
    iced::{
        Length, Subscription,
        platform_specific::shell::wayland::commands::popup::{destroy_popup, get_popup},
        task,
        widget::{Column, column, row},
        window,
    },
    iced_core::{Alignment, Color},
    iced_runtime::core::layout::Limits,
    theme::{self, Button},
    widget::{button, container, divider, dropdown, horizontal_space, icon, slider, text},
};
use cosmic_applets_config::wireless_hid::{PanelBox, WirelessHidAppletConfig};
use cosmic_config::{Config, CosmicConfigEntry};
use cosmic_time::{Instant, Timeline, anim, chain, id};
use rustc_hash::FxHashMap;
use std::{rc::Rc, sync::LazyLock};

static HIDE_UNKNOWN: LazyLock<id::Toggler> = LazyLock::new(id::Toggler::unique);
static HIDE_ELAN: LazyLock<id::Toggler> = LazyLock::new(id::Toggler::unique);
static DEVICE_LEVELS: LazyLock<id::Toggler> = LazyLock::new(id::Toggler::unique);
static HIGHLIGHT_CHARGED: LazyLock<id::Toggler> = LazyLock::new(id::Toggler::unique);

const MAX_UPDATE_TIMEOUT: u32 = 600;
const MAX_PANEL_BOX_INDEX: u32 = 20;

pub fn run() -> cosmic::iced::Result {
    cosmic::applet::run::<CosmicWirelessHidApplet>(())
}

fn level_color(color: LevelColor) -> Color {
    let [r, g, b] = color.rgb8();
    Color::from_rgb8(r, g, b)
}

fn device_icon(row: &DeviceRow, size: u16) -> icon::Icon {
    let icon = icon::from_name(row.icon_name).size(size).symbolic(true).icon();
    match row.color {
        Some(color) => {
            let color = level_color(color);
            icon.class(theme::Svg::Custom(Rc::new(move |_: &cosmic::Theme| {
                cosmic::iced_widget::svg::Style { color: Some(color) }
            })))
        }
        None => icon,
    }
}

struct CosmicWirelessHidApplet {
    core: cosmic::app::Core,
    popup: Option<window::Id>,
    presenter: Presenter<PanelIndicator>,
    config_handler: Option<Config>,
    connection: Option<zbus::Connection>,
    /// Sleeping inactivity timers, one per device.
    timers: FxHashMap<String, (TimerTicket, task::Handle)>,
    /// Timeout slider position while it is being dragged.
    pending_timeout: Option<u32>,
    /// Index slider position while it is being dragged.
    pending_index: Option<u32>,
    panel_boxes: Vec<String>,
    timeline: Timeline,
}

#[derive(Debug, Clone)]
enum Message {
    TogglePopup,
    CloseRequested(window::Id),
    Frame(Instant),
    Upower(UpowerEvent),
    Device(DeviceEvent),
    DeviceTimeout(TimerTicket),
    ConfigChanged(WirelessHidAppletConfig),
    HideUnknownBatteryState(chain::Toggler, bool),
    HideElan(chain::Toggler, bool),
    UseDeviceLevels(chain::Toggler, bool),
    HighlightChargedDevices(chain::Toggler, bool),
    SetDeviceUpdateTimeout(u32),
    ReleaseDeviceUpdateTimeout,
    SetPanelBox(usize),
    SetPanelBoxIndex(u32),
    ReleasePanelBoxIndex,
}

impl CosmicWirelessHidApplet {
    fn schedule(&mut self, tickets: impl IntoIterator<Item = TimerTicket>) -> app::Task<Message> {
        Task::batch(tickets.into_iter().map(|ticket| {
            let delay = ticket.delay;
            let device = ticket.device.clone();
            let fired = ticket.clone();
            let (task, handle) = Task::perform(tokio::time::sleep(delay), move |_| {
                cosmic::Action::App(Message::DeviceTimeout(fired))
            })
            .abortable();

            if let Some((_, previous)) = self.timers.insert(device, (ticket, handle)) {
                previous.abort();
            }
            task
        }))
    }

    fn cancel_timer(&mut self, device: &str) {
        if let Some((_, handle)) = self.timers.remove(device) {
            handle.abort();
        }
    }

    fn cancel_all_timers(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }

    /// Aborts timers of devices that are gone or no longer waiting.
    fn prune_timers(&mut self) {
        let registry = self.presenter.registry();
        self.timers.retain(|id, (_, handle)| {
            let pending = registry.get(id).is_some_and(|hid| hid.has_pending_timeout());
            if !pending {
                handle.abort();
            }
            pending
        });
    }

    fn apply_config(&mut self, config: WirelessHidAppletConfig) -> app::Task<Message> {
        if config == *self.presenter.config() {
            return Task::none();
        }
        let tickets = self.presenter.config_changed(config);
        self.prune_timers();
        self.schedule(tickets)
    }

    /// Persists a settings change made in the popup and applies it at once.
    fn write_config(
        &mut self,
        write: impl FnOnce(
            &mut WirelessHidAppletConfig,
            &Config,
        ) -> Result<bool, cosmic_config::Error>,
    ) -> app::Task<Message> {
        let Some(handler) = self.config_handler.as_ref() else {
            tracing::error!("No config handler to save settings with");
            return Task::none();
        };
        let mut config = self.presenter.config().clone();
        if let Err(err) = write(&mut config, handler) {
            tracing::error!(?err, "Error writing config");
        }
        self.apply_config(config)
    }

    fn settings_view(&self) -> Column<'_, Message> {
        let config = self.presenter.config();
        let timeout = self
            .pending_timeout
            .unwrap_or(config.device_update_timeout);
        let index = self
            .pending_index
            .or(config.panel_box_index)
            .unwrap_or_default();

        let toggler = |id: id::Toggler,
                       label: String,
                       value: bool,
                       message: fn(chain::Toggler, bool) -> Message| {
            padded_control(
                anim!(
                    // toggler
                    id,
                    &self.timeline,
                    Some(label),
                    value,
                    message,
                )
                .text_size(14)
                .width(Length::Fill),
            )
        };

        let timeout_label = if timeout == 0 {
            fl!("disabled")
        } else {
            fl!("seconds", seconds = timeout)
        };

        column![
            padded_control(text::heading(fl!("settings"))),
            toggler(
                HIDE_UNKNOWN.clone(),
                fl!("hide-unknown-battery-state"),
                config.hide_unknown_battery_state,
                Message::HideUnknownBatteryState,
            ),
            toggler(
                HIDE_ELAN.clone(),
                fl!("hide-elan"),
                config.hide_elan,
                Message::HideElan,
            ),
            toggler(
                DEVICE_LEVELS.clone(),
                fl!("use-device-levels"),
                config.use_device_levels,
                Message::UseDeviceLevels,
            ),
            toggler(
                HIGHLIGHT_CHARGED.clone(),
                fl!("highlight-charged-devices"),
                config.highlight_charged_devices,
                Message::HighlightChargedDevices,
            ),
            padded_control(column![
                text::body(fl!("device-update-timeout")),
                row![
                    slider(
                        0..=MAX_UPDATE_TIMEOUT,
                        timeout,
                        Message::SetDeviceUpdateTimeout
                    )
                    .on_release(Message::ReleaseDeviceUpdateTimeout),
                    container(text::body(timeout_label))
                        .width(Length::Fixed(56.0))
                        .align_x(Alignment::End),
                ]
                .align_y(Alignment::Center)
                .spacing(12),
            ]),
            padded_control(
                row![
                    text::body(fl!("panel-position")).width(Length::Fill),
                    dropdown(
                        &self.panel_boxes,
                        Some(config.panel_box.unwrap_or_default().position()),
                        Message::SetPanelBox,
                    ),
                ]
                .align_y(Alignment::Center)
                .spacing(12),
            ),
            padded_control(column![
                text::body(fl!("panel-box-index")),
                row![
                    slider(0..=MAX_PANEL_BOX_INDEX, index, Message::SetPanelBoxIndex)
                        .on_release(Message::ReleasePanelBoxIndex),
                    container(text::body(index.to_string()))
                        .width(Length::Fixed(56.0))
                        .align_x(Alignment::End),
                ]
                .align_y(Alignment::Center)
                .spacing(12),
            ]),
        ]
    }
}

impl cosmic::Application for CosmicWirelessHidApplet {
    type Message = Message;
    type Executor = cosmic::SingleThreadExecutor;
    type Flags = ();
    const APP_ID: &'static str = APP_ID;

    fn init(core: cosmic::app::Core, _flags: Self::Flags) -> (Self, app::Task<Self::Message>) {
        let config_handler = match Config::new(Self::APP_ID, WirelessHidAppletConfig::VERSION) {
            Ok(handler) => Some(handler),
            Err(err) => {
                tracing::error!(?err, "Failed to open applet config");
                None
            }
        };
        let config = config_handler
            .as_ref()
            .and_then(|c| WirelessHidAppletConfig::get_entry(c).ok())
            .unwrap_or_default();

        let indicator = PanelIndicator::new(Self::APP_ID, &core.applet.panel_type.to_string());
        let mut presenter = Presenter::new(config, indicator);
        presenter.enable();

        (
            Self {
                core,
                popup: None,
                presenter,
                config_handler,
                connection: None,
                timers: FxHashMap::default(),
                pending_timeout: None,
                pending_index: None,
                panel_boxes: vec![fl!("start"), fl!("center"), fl!("end")],
                timeline: Timeline::new(),
            },
            Task::none(),
        )
    }

    fn core(&self) -> &cosmic::app::Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut cosmic::app::Core {
        &mut self.core
    }

    fn update(&mut self, message: Self::Message) -> app::Task<Self::Message> {
        match message {
            Message::TogglePopup => {
                if let Some(p) = self.popup.take() {
                    return destroy_popup(p);
                }
                let Some(main_window) = self.core.main_window_id() else {
                    return Task::none();
                };
                self.timeline = Timeline::new();

                let new_id = window::Id::unique();
                self.popup.replace(new_id);

                let mut popup_settings =
                    self.core
                        .applet
                        .get_popup_settings(main_window, new_id, None, None, None);
                popup_settings.positioner.size_limits = Limits::NONE
                    .max_width(372.0)
                    .min_width(300.0)
                    .min_height(200.0)
                    .max_height(1080.0);

                return get_popup(popup_settings);
            }
            Message::CloseRequested(id) => {
                if Some(id) == self.popup {
                    self.popup = None;
                }
            }
            Message::Frame(now) => self.timeline.now(now),
            Message::Upower(event) => match event {
                UpowerEvent::Connected(conn) => {
                    self.connection = Some(conn);
                }
                UpowerEvent::Devices(devices) => {
                    let tickets = self.presenter.reconcile(devices);
                    self.prune_timers();
                    return self.schedule(tickets);
                }
                UpowerEvent::ServiceAvailable => {
                    self.cancel_all_timers();
                    self.presenter.enable();
                }
                UpowerEvent::ServiceLost => {
                    self.cancel_all_timers();
                    self.presenter.disable();
                }
                UpowerEvent::Error(err) => {
                    tracing::error!("{err}");
                }
            },
            Message::Device(event) => match event {
                DeviceEvent::Changed(device) => {
                    let id = device.id().to_string();
                    match self.presenter.device_changed(device) {
                        Some(ticket) => return self.schedule([ticket]),
                        None => self.cancel_timer(&id),
                    }
                }
                DeviceEvent::Error(err) => {
                    tracing::warn!("{err}");
                }
            },
            Message::DeviceTimeout(ticket) => {
                if self
                    .timers
                    .get(&ticket.device)
                    .is_some_and(|(armed, _)| *armed == ticket)
                {
                    self.timers.remove(&ticket.device);
                }
                self.presenter.timeout(&ticket);
            }
            Message::ConfigChanged(config) => {
                return self.apply_config(config);
            }
            Message::HideUnknownBatteryState(chain, enabled) => {
                self.timeline.set_chain(chain).start();
                return self.write_config(|config, handler| {
                    config.set_hide_unknown_battery_state(handler, enabled)
                });
            }
            Message::HideElan(chain, enabled) => {
                self.timeline.set_chain(chain).start();
                return self.write_config(|config, handler| config.set_hide_elan(handler, enabled));
            }
            Message::UseDeviceLevels(chain, enabled) => {
                self.timeline.set_chain(chain).start();
                return self
                    .write_config(|config, handler| config.set_use_device_levels(handler, enabled));
            }
            Message::HighlightChargedDevices(chain, enabled) => {
                self.timeline.set_chain(chain).start();
                return self.write_config(|config, handler| {
                    config.set_highlight_charged_devices(handler, enabled)
                });
            }
            Message::SetDeviceUpdateTimeout(seconds) => {
                self.pending_timeout = Some(seconds);
            }
            Message::ReleaseDeviceUpdateTimeout => {
                if let Some(seconds) = self.pending_timeout.take() {
                    return self.write_config(|config, handler| {
                        config.set_device_update_timeout(handler, seconds)
                    });
                }
            }
            Message::SetPanelBox(position) => {
                if let Some(panel_box) = PanelBox::from_position(position) {
                    return self.write_config(|config, handler| {
                        config.set_panel_box(handler, Some(panel_box))
                    });
                }
            }
            Message::SetPanelBoxIndex(index) => {
                self.pending_index = Some(index);
            }
            Message::ReleasePanelBoxIndex => {
                if let Some(index) = self.pending_index.take() {
                    return self.write_config(|config, handler| {
                        config.set_panel_box_index(handler, Some(index))
                    });
                }
            }
        }
        Task::none()
    }

    fn view(&self) -> Element<'_, Message> {
        if !self.presenter.indicator().is_visible() {
            return self
                .core
                .applet
                .autosize_window(horizontal_space().width(Length::Fixed(0.0)))
                .into();
        }

        let Spacing { space_xxs, .. } = theme::active().cosmic().spacing;
        let is_horizontal = match self.core.applet.anchor {
            PanelAnchor::Top | PanelAnchor::Bottom => true,
            PanelAnchor::Left | PanelAnchor::Right => false,
        };
        let (icon_size, _) = self.core.applet.suggested_size(true);
        let applet_padding = self.core.applet.suggested_padding(true);

        let children: Vec<Element<'_, Message>> = self
            .presenter
            .rows()
            .into_iter()
            .map(|row| device_icon(row, icon_size).into())
            .collect();

        let content: Element<'_, Message> = if is_horizontal {
            row(children)
                .spacing(space_xxs)
                .align_y(Alignment::Center)
                .into()
        } else {
            column(children)
                .spacing(space_xxs)
                .align_x(Alignment::Center)
                .into()
        };

        let btn = button::custom(content)
            .on_press_down(Message::TogglePopup)
            .class(Button::AppletIcon)
            .padding([applet_padding.0, applet_padding.1]);

        self.core.applet.autosize_window(btn).into()
    }

    fn view_window(&self, _id: window::Id) -> Element<'_, Message> {
        let Spacing {
            space_xxs, space_s, ..
        } = theme::active().cosmic().spacing;

        let rows = self.presenter.rows();
        let mut devices = Column::new().spacing(space_xxs);
        if rows.is_empty() {
            devices = devices.push(padded_control(text::body(fl!("no-devices"))));
        }
        for device in rows {
            let name = device
                .name
                .clone()
                .unwrap_or_else(|| fl!("unknown-device"));
            let mut label = text::body(device.label.clone());
            if let Some(color) = device.color {
                label = label.class(theme::Text::Color(level_color(color)));
            }
            devices = devices.push(padded_control(
                row![
                    device_icon(device, 24),
                    text::body(name).width(Length::Fill),
                    label,
                ]
                .align_y(Alignment::Center)
                .spacing(12),
            ));
        }

        let content = column![
            padded_control(text::heading(fl!("wireless-devices"))),
            devices,
            padded_control(divider::horizontal::default()).padding([space_xxs, space_s]),
            self.settings_view(),
        ]
        .padding([8, 0]);

        self.core
            .applet
            .popup_container(container(content))
            .max_width(372.)
            .max_height(1080.)
            .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            upower_subscription(0).map(Message::Upower),
            self.timeline
                .as_subscription()
                .map(|(_, now)| Message::Frame(now)),
            self.core.watch_config(Self::APP_ID).map(|u| {
                for err in u.errors {
                    tracing::error!(?err, "Error watching config");
                }
                Message::ConfigChanged(u.config)
            }),
        ];

        if let Some(conn) = self.connection.as_ref() {
            if self.presenter.is_enabled() {
                subscriptions.extend(self.presenter.registry().ids().map(|id| {
                    device_subscription(conn.clone(), id.to_string()).map(Message::Device)
                }));
            }
        }

        Subscription::batch(subscriptions)
    }

    fn on_close_requested(&self, id: window::Id) -> Option<Message> {
        Some(Message::CloseRequested(id))
    }

    fn style(&self) -> Option<cosmic::iced_runtime::Appearance> {
        Some(cosmic::applet::style())
    }
}
