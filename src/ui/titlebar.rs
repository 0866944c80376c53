use super::{
    AnyElement, AppView, Context, Hsla, InteractiveElement, IntoElement, ParentElement, Screen,
    Styled, TITLEBAR_BG, TrackingState, Window, WindowControlArea, div, h_flex, px,
};

#[cfg(target_os = "windows")]
use super::SharedString;

struct StatusPill {
    color: Hsla,
    icon: &'static str,
    text: String,
}

impl AppView {
    pub(super) fn render_titlebar(&self, window: &mut Window, cx: &mut Context<'_, Self>) -> AnyElement {
        #[cfg(target_os = "windows")]
        let controls = self.render_windows_controls(window, cx);

        #[cfg(target_os = "macos")]
        let controls = self.render_macos_controls(window, cx);

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let controls = self.render_linux_controls(window, cx);

        let pills = self
            .status_pills()
            .into_iter()
            .map(|pill| {
                div()
                    .px_2()
                    .py_0p5()
                    .rounded_md()
                    .bg(gpui::rgba(0x00000033))
                    .text_xs()
                    .text_color(pill.color)
                    .child(format!("{} {}", pill.icon, pill.text))
            });

        h_flex()
            .window_control_area(WindowControlArea::Drag)
            .h(px(32.0))
            .w_full()
            .items_center()
            .justify_between()
            .bg(gpui::rgb(TITLEBAR_BG))
            .child(
                h_flex()
                    .gap_3()
                    .pl(px(80.0))
                    .pr_3()
                    .h_full()
                    .items_center()
                    .children(pills),
            )
            .child(controls)
            .into_any_element()
    }

    fn status_pills(&self) -> Vec<StatusPill> {
        let ok: Hsla = gpui::rgb(0x4ade80).into();
        let pending: Hsla = gpui::rgb(0xfbbf24).into();
        let bad: Hsla = gpui::rgb(0xf87171).into();
        let idle: Hsla = gpui::rgb(0x8b95a5).into();

        let session = match &self.screen {
            Screen::Start => StatusPill {
                color: idle,
                icon: "○",
                text: "未开始".into(),
            },
            Screen::Preparing(_) => StatusPill {
                color: pending,
                icon: "⟳",
                text: "准备中".into(),
            },
            Screen::Running => match self.latest_report.map(|r| r.state) {
                Some(TrackingState::Tracking) => StatusPill {
                    color: ok,
                    icon: "●",
                    text: "追踪中".into(),
                },
                Some(TrackingState::Idle) => StatusPill {
                    color: idle,
                    icon: "○",
                    text: "未检测到人脸".into(),
                },
                None => StatusPill {
                    color: pending,
                    icon: "⟳",
                    text: "等待画面".into(),
                },
            },
            Screen::Failed(_) => StatusPill {
                color: bad,
                icon: "✗",
                text: "启动失败".into(),
            },
        };

        let Some(handles) = &self.handles else {
            return vec![session];
        };

        let camera = StatusPill {
            color: ok,
            icon: "◉",
            text: handles.camera_label().to_string(),
        };
        let microphone = match (self.config.audio, handles.microphone_label()) {
            (false, _) => StatusPill {
                color: idle,
                icon: "♪",
                text: "声音关闭".into(),
            },
            (true, Some(name)) => StatusPill {
                color: ok,
                icon: "♪",
                text: name.to_string(),
            },
            (true, None) => StatusPill {
                color: pending,
                icon: "♪",
                text: "麦克风不可用".into(),
            },
        };
        vec![session, camera, microphone]
    }

    #[cfg(target_os = "windows")]
    fn render_windows_controls(&self, window: &mut Window, _cx: &mut Context<'_, Self>) -> AnyElement {
        let button_height = px(32.0);
        let hover = gpui::rgb(0x404040);
        let close_hover = gpui::rgb(0xe81120);
        let font_family: SharedString = "Segoe Fluent Icons".into();
        let max_icon = if window.is_maximized() { "\u{e923}" } else { "\u{e922}" };

        let button = |id: &'static str, area: WindowControlArea, icon: &'static str, hover_bg: gpui::Rgba| {
            div()
                .id(id)
                .flex()
                .items_center()
                .justify_center()
                .occlude()
                .w(px(46.0))
                .h_full()
                .text_size(px(10.0))
                .hover(move |s| s.bg(hover_bg))
                .window_control_area(area)
                .child(icon)
        };

        h_flex()
            .id("windows-window-controls")
            .font_family(font_family)
            .max_h(button_height)
            .min_h(button_height)
            .child(button("minimize", WindowControlArea::Min, "\u{e921}", hover))
            .child(button("maximize-or-restore", WindowControlArea::Max, max_icon, hover))
            .child(button("close", WindowControlArea::Close, "\u{e8bb}", close_hover))
            .into_any_element()
    }

    #[cfg(target_os = "macos")]
    fn render_macos_controls(&self, _window: &mut Window, _cx: &mut Context<'_, Self>) -> AnyElement {
        div().into_any_element()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn render_linux_controls(&self, _window: &mut Window, _cx: &mut Context<'_, Self>) -> AnyElement {
        let icon_color = gpui::rgb(0xc9d1d9);
        let hover = gpui::rgb(0x1f2428);
        let close_hover = gpui::rgb(0xe81123);

        let button = |id: &'static str, area: WindowControlArea, path: &'static str, hover_bg: gpui::Rgba| {
            div()
                .id(id)
                .size(px(28.0))
                .flex()
                .items_center()
                .justify_center()
                .rounded_md()
                .cursor_pointer()
                .window_control_area(area)
                .hover(move |s| s.bg(hover_bg))
                .child(gpui::svg().size(px(16.0)).path(path).text_color(icon_color))
        };

        h_flex()
            .gap_1()
            .px_2()
            .child(button("linux-minimize", WindowControlArea::Min, "M 4,8 H 12", hover))
            .child(button("linux-maximize", WindowControlArea::Max, "M 4,4 H 12 V 12 H 4 Z", hover))
            .child(button(
                "linux-close",
                WindowControlArea::Close,
                "M 4,4 L 12,12 M 12,4 L 4,12",
                close_hover,
            ))
            .into_any_element()
    }
}
