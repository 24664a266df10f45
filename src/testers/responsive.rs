//! Responsive tester: horizontal overflow at common viewports.

use super::navigate;
use crate::config;
use crate::defects::{Defect, DefectType, Severity};
use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::Page;
use serde::Deserialize;

struct ViewportSpec {
    name: &'static str,
    width: i64,
    height: i64,
    mobile: bool,
    severity: Severity,
}

const VIEWPORTS: [ViewportSpec; 3] = [
    ViewportSpec {
        name: "Mobile",
        width: 375,
        height: 812,
        mobile: true,
        severity: Severity::Warning,
    },
    ViewportSpec {
        name: "Tablet",
        width: 768,
        height: 1024,
        mobile: false,
        severity: Severity::Warning,
    },
    ViewportSpec {
        name: "Desktop",
        width: 1440,
        height: 900,
        mobile: false,
        severity: Severity::Info,
    },
];

const OVERFLOW_PROBE_JS: &str = r#"
({
    scrollWidth: document.documentElement.scrollWidth,
    clientWidth: document.documentElement.clientWidth
})
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverflowProbe {
    scroll_width: i64,
    client_width: i64,
}

pub async fn run(page: &Page, url: &str) -> Result<Vec<Defect>> {
    let mut defects = Vec::new();
    for viewport in &VIEWPORTS {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width)
            .height(viewport.height)
            .device_scale_factor(1.0)
            .mobile(viewport.mobile)
            .build()
            .map_err(|e| anyhow::anyhow!("device metrics params: {e}"))?;
        page.execute(metrics).await?;

        navigate(page, url).await?;
        tokio::time::sleep(config::SETTLE_SHORT).await;

        let probe: OverflowProbe = page.evaluate(OVERFLOW_PROBE_JS).await?.into_value()?;
        if probe.scroll_width > probe.client_width {
            defects.push(Defect::new(
                DefectType::Responsive,
                viewport.severity,
                format!("Horizontal overflow at {}", viewport.name),
                format!(
                    "Page has horizontal overflow at {}px width. Content width: {}px, viewport: {}px.",
                    viewport.width, probe.scroll_width, viewport.width
                ),
                url,
            ));
        }
    }
    Ok(defects)
}
