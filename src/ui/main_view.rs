use std::sync::Arc;

use super::render_util::{frame_to_image, level_meter};
use super::{
    ActiveTheme, AnyElement, AppView, Context, IntoElement, ObjectFit, ParentElement, RenderImage,
    Styled, StyledImage, TrackingState, Window, div, h_flex, img, v_flex,
};

impl AppView {
    pub(super) fn render_main(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> AnyElement {
        let mut newest = None;
        while let Ok(composited) = self.frame_rx.try_recv() {
            newest = Some(composited);
        }
        if let Some(composited) = newest {
            self.latest_report = Some(composited.report);
            self.latest_size = Some((composited.frame.width, composited.frame.height));
            self.frames_shown += 1;
            if let Some(image) = frame_to_image(composited.frame) {
                self.replace_latest_image(image, window, cx);
            }
        }

        let worker_alive = self.handles.as_ref().is_some_and(|h| h.worker_alive());
        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child(if worker_alive {
                    "等待摄像头画面..."
                } else {
                    "会话已结束"
                })
                .into_any_element()
        };

        v_flex()
            .size_full()
            .child(
                div()
                    .flex_1()
                    .w_full()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x000000))
                    .child(frame_view),
            )
            .child(self.render_stats(worker_alive, cx))
            .into_any_element()
    }

    fn render_stats(&self, worker_alive: bool, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let report = self.latest_report.unwrap_or_default();

        let state_text = match (worker_alive, report.state) {
            (false, _) => "● 已停止".to_string(),
            (true, TrackingState::Idle) => "○ 未检测到人脸".to_string(),
            (true, TrackingState::Tracking) => format!("● 追踪 {} 张脸", report.faces),
        };
        let state_color = match (worker_alive, report.state) {
            (true, TrackingState::Tracking) => theme.success,
            (true, TrackingState::Idle) => theme.muted_foreground,
            (false, _) => theme.accent,
        };

        let size_text = self
            .latest_size
            .map(|(w, h)| format!("{w}x{h}"))
            .unwrap_or_else(|| "--".to_string());

        let mut row = h_flex()
            .w_full()
            .gap_4()
            .px_4()
            .py_2()
            .items_center()
            .bg(theme.background)
            .border_t_1()
            .border_color(theme.border)
            .text_sm()
            .child(div().text_color(state_color).child(state_text))
            .child(
                div()
                    .text_color(theme.muted_foreground)
                    .child(format!("细胞 {}", report.cells)),
            );

        if self.config.audio {
            row = row.child(
                h_flex()
                    .gap_3()
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(format!("音量 {}", level_meter(report.audio.volume)))
                    .child(format!("高音 {}", level_meter(report.audio.treble))),
            );
        }

        row.child(div().flex_1())
            .child(
                div()
                    .text_xs()
                    .text_color(theme.muted_foreground)
                    .child(format!("{size_text} · 第 {} 帧 · t={:.2}", self.frames_shown, report.time)),
            )
            .into_any_element()
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        // The sprite atlas keeps every texture it has seen until told otherwise.
        if let Some(old_image) = self.latest_image.replace(new_image) {
            cx.drop_image(old_image, Some(window));
        }
    }
}
