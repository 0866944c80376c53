use std::{mem, sync::Arc};

use crossbeam_channel::{Receiver, Sender, bounded};
use gpui::{
    AnyElement, App, AppContext, Context, Hsla, InteractiveElement, IntoElement, ObjectFit,
    ParentElement, Render, RenderImage, SharedString, Styled, StyledImage, TitlebarOptions,
    Window, WindowControlArea, WindowDecorations, WindowOptions, div, img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    bootstrap::{BootstrapError, BootstrapMessage, BootstrapStage, SessionHandles, spawn_bootstrap},
    config::AppConfig,
    model_download::{ModelDownloadEvent, ModelKind},
    session::{FrameReport, TrackingState},
    types::CompositedFrame,
};

mod download;
mod main_view;
mod render_util;
mod start_view;
mod titlebar;

const TITLEBAR_BG: u32 = 0x1a2332;

pub fn launch_ui(app: &mut App, config: AppConfig) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Face Cells".into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_decorations: Some(WindowDecorations::Client),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    config: AppConfig,
    /// Handed to the bootstrap thread on start; `None` afterwards.
    frame_tx: Option<Sender<CompositedFrame>>,
    frame_rx: Receiver<CompositedFrame>,
    bootstrap_rx: Option<Receiver<BootstrapMessage>>,
    /// Dropping these stops the camera and, with it, the worker.
    handles: Option<SessionHandles>,
    latest_report: Option<FrameReport>,
    latest_size: Option<(u32, u32)>,
    latest_image: Option<Arc<RenderImage>>,
    frames_shown: u64,
}

enum Screen {
    Start,
    Preparing(PreparingState),
    Running,
    Failed(BootstrapError),
}

struct PreparingState {
    stage: Option<BootstrapStage>,
    model: Option<ModelKind>,
    downloaded: u64,
    total: Option<u64>,
    downloading: bool,
    models_ready: usize,
}

impl PreparingState {
    fn new() -> Self {
        Self {
            stage: None,
            model: None,
            downloaded: 0,
            total: None,
            downloading: false,
            models_ready: 0,
        }
    }

    fn apply(&mut self, event: ModelDownloadEvent) {
        match event {
            ModelDownloadEvent::AlreadyPresent { model } => {
                self.model = Some(model);
                self.downloading = false;
            }
            ModelDownloadEvent::Started { model, total } => {
                self.model = Some(model);
                self.downloaded = 0;
                self.total = total;
                self.downloading = true;
            }
            ModelDownloadEvent::Progress {
                model,
                downloaded,
                total,
            } => {
                self.model = Some(model);
                self.downloaded = downloaded;
                self.total = total;
            }
            ModelDownloadEvent::Finished { model } => {
                self.model = Some(model);
                self.downloading = false;
                self.models_ready += 1;
            }
        }
    }
}

impl AppView {
    fn new(config: AppConfig) -> Self {
        let (frame_tx, frame_rx) = bounded(1);
        Self {
            screen: Screen::Start,
            config,
            frame_tx: Some(frame_tx),
            frame_rx,
            bootstrap_rx: None,
            handles: None,
            latest_report: None,
            latest_size: None,
            latest_image: None,
            frames_shown: 0,
        }
    }

    /// Kicks off device and model acquisition. Only the first call does
    /// anything.
    fn start_session(&mut self) {
        let Some(frame_tx) = self.frame_tx.take() else {
            return;
        };
        log::info!("start requested");
        self.bootstrap_rx = Some(spawn_bootstrap(self.config.clone(), frame_tx));
        self.screen = Screen::Preparing(PreparingState::new());
    }

    /// Drains bootstrap progress. Returns the next screen once bootstrap
    /// settles either way.
    fn poll_bootstrap(&mut self, state: &mut PreparingState) -> Option<Screen> {
        let rx = self.bootstrap_rx.as_ref()?;
        let mut next = None;
        while let Ok(message) = rx.try_recv() {
            match message {
                BootstrapMessage::Stage(stage) => state.stage = Some(stage),
                BootstrapMessage::Download(event) => state.apply(event),
                BootstrapMessage::Ready(handles) => {
                    self.handles = Some(handles);
                    next = Some(Screen::Running);
                }
                BootstrapMessage::Failed(err) => {
                    next = Some(Screen::Failed(err));
                }
            }
        }
        if next.is_some() {
            self.bootstrap_rx = None;
        }
        next
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let mut screen = mem::replace(&mut self.screen, Screen::Start);
        let body = match screen {
            Screen::Start => {
                screen = Screen::Start;
                self.render_start_view(cx)
            }
            Screen::Preparing(mut state) => {
                let next = self.poll_bootstrap(&mut state);
                let view = self.render_preparing_view(&state, cx);
                screen = next.unwrap_or(Screen::Preparing(state));
                view
            }
            Screen::Running => {
                screen = Screen::Running;
                self.render_main(window, cx)
            }
            Screen::Failed(err) => {
                let view = self.render_failed_view(&err, cx);
                screen = Screen::Failed(err);
                view
            }
        };
        self.screen = screen;

        let titlebar = self.render_titlebar(window, cx);
        v_flex()
            .size_full()
            .bg(gpui::rgb(TITLEBAR_BG))
            .child(titlebar)
            .child(div().flex_1().w_full().overflow_hidden().child(body))
    }
}
