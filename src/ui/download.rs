use super::{
    ActiveTheme, AnyElement, AppView, BootstrapStage, Context, IntoElement, ModelKind,
    ParentElement, PreparingState, Styled, StyledExt, div, h_flex, v_flex,
};

const BAR_LEN: usize = 30;

impl AppView {
    pub(super) fn render_preparing_view(
        &self,
        state: &PreparingState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let stage_text = state.stage.map(stage_text).unwrap_or("正在启动...");
        let model_text = state
            .model
            .map(|model| {
                format!(
                    "{} ({}/{})",
                    model_text(model),
                    state.models_ready.min(ModelKind::ALL.len()),
                    ModelKind::ALL.len()
                )
            })
            .unwrap_or_else(|| "等待模型检查".to_string());

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .w(gpui::px(420.0))
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
                            .text_color(theme.foreground)
                            .font_semibold()
                            .child(format!("⟳ {stage_text}")),
                    ),
            )
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child(model_text),
            );

        if state.downloading {
            let detail = match state.total {
                Some(total) if total > 0 => format!(
                    "{} / {} KB",
                    state.downloaded / 1024,
                    total / 1024
                ),
                _ => format!("已下载 {} KB", state.downloaded / 1024),
            };
            container = container
                .child(
                    div()
                        .px_3()
                        .py_2()
                        .rounded_md()
                        .border_1()
                        .border_color(theme.border)
                        .bg(theme.muted)
                        .font_family(theme.mono_font_family.clone())
                        .text_color(theme.foreground)
                        .child(progress_bar_string(state.downloaded, state.total)),
                )
                .child(
                    div()
                        .text_sm()
                        .text_color(theme.muted_foreground)
                        .child(detail),
                );
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

fn stage_text(stage: BootstrapStage) -> &'static str {
    match stage {
        BootstrapStage::Camera => "正在打开摄像头",
        BootstrapStage::Microphone => "正在打开麦克风",
        BootstrapStage::Models => "正在准备模型",
        BootstrapStage::Detector => "正在加载面部识别模型",
        BootstrapStage::Worker => "即将开始",
    }
}

fn model_text(model: ModelKind) -> &'static str {
    match model {
        ModelKind::FaceDetector => "人脸检测模型",
        ModelKind::FaceLandmarker => "面部关键点模型",
    }
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        // Unknown size: a marker that walks across the bar as bytes arrive.
        _ => {
            let offset = (downloaded / (64 * 1024)) as usize % BAR_LEN;
            format!(
                "[{}>{}] 大小未知",
                "-".repeat(offset),
                " ".repeat(BAR_LEN - offset - 1)
            )
        }
    }
}
