use super::{
    ActiveTheme, AnyElement, AppView, BootstrapError, Button, ButtonVariants, Context, IntoElement,
    ParentElement, SharedString, Styled, StyledExt, Tag, div, h_flex, v_flex,
};
use crate::config::Variant;

impl AppView {
    pub(super) fn render_start_view(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let start_button = Button::new(SharedString::from("session-start"))
            .primary()
            .label("▶ 开始")
            .w_full()
            .mt_2()
            .on_click(cx.listener(|this, _, _, cx| {
                this.start_session();
                cx.notify();
            }));

        let theme = cx.theme();
        let variant = self.config.variant;
        let audio_text = if self.config.audio {
            "需要麦克风权限，声音越大细胞越活跃"
        } else {
            "不使用麦克风"
        };

        let card = v_flex()
            .gap_3()
            .p_6()
            .w(gpui::px(360.0))
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                div()
                    .text_color(theme.foreground)
                    .font_semibold()
                    .child("面部细胞"),
            )
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child(format!(
                        "模式: {}，最多追踪 {} 张脸",
                        variant_text(variant),
                        self.config.detector.max_faces
                    )),
            )
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child(audio_text),
            )
            .child(start_button);

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(card)
            .into_any_element()
    }

    pub(super) fn render_failed_view(
        &self,
        err: &BootstrapError,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let title = match err {
            BootstrapError::Camera(_) => "无法打开摄像头",
            BootstrapError::Model { .. } => "模型不可用",
            BootstrapError::Detector(_) => "模型加载失败",
            BootstrapError::Worker(_) => "启动失败",
        };

        let card = v_flex()
            .gap_3()
            .p_6()
            .max_w(gpui::px(520.0))
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(theme.accent)
                            .font_semibold()
                            .child(format!("✗ {title}")),
                    ),
            )
            .child(Tag::danger().rounded_full().child(format!("错误: {err}")))
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child("请检查设备或模型后重新启动程序"),
            );

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(card)
            .into_any_element()
    }
}

fn variant_text(variant: Variant) -> &'static str {
    match variant {
        Variant::Single => "单人",
        Variant::Multi => "多人",
        Variant::Reactive => "多人 + 声音",
    }
}
