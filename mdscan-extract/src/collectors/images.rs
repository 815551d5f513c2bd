use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use crate::security::{validate_image_data_uri, DataUriCheck, UrlRejection, WarningKind};
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
struct ImageRecord {
    alt: String,
    src: Option<String>,
    title: Option<String>,
    line: Option<usize>,
    data_uri: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<&'static str>,
}

/// Images. Inline `data:` sources are kept only when they are `image/*`, free of control
/// and bidi characters and within the profile's size budget; every other source goes
/// through the URL policy.
pub struct ImagesCollector {
    images: CappedList<ImageRecord>,
}

impl ImagesCollector {
    pub fn new(cap: usize) -> Self {
        ImagesCollector {
            images: CappedList::new(cap),
        }
    }

    fn record(&mut self, image: &Token, line: Option<usize>, ctx: &DispatchContext<'_>) {
        let raw = image.attr("src").unwrap_or_default();
        let mut record = ImageRecord {
            alt: crate::inline_text::collapse_whitespace(&image.content),
            src: None,
            title: image.attr("title").map(str::to_string),
            line,
            data_uri: false,
            rejected: None,
        };

        match ctx.policy().check_data_uri(raw) {
            DataUriCheck::Within { media_type, .. } => {
                record.data_uri = true;
                match validate_image_data_uri(raw, &media_type) {
                    Ok(src) => record.src = Some(src),
                    Err(rejection) => reject(&mut record, raw, rejection, ctx),
                }
            }
            DataUriCheck::OverBudget { media_type, bytes } => {
                record.data_uri = true;
                record.rejected = Some(WarningKind::DataUriOverBudget.as_str());
                ctx.warn(
                    WarningKind::DataUriOverBudget,
                    format!(
                        "{} data URI of at least {} bytes exceeds the {} byte budget",
                        media_type,
                        bytes,
                        ctx.policy().max_data_uri_bytes
                    ),
                    line,
                );
            }
            DataUriCheck::NotDataUri => match ctx.policy().validate_url(raw) {
                Ok(validated) => record.src = Some(validated.url),
                Err(rejection) => reject(&mut record, raw, rejection, ctx),
            },
        }
        self.images.push(record);
    }
}

fn reject(record: &mut ImageRecord, raw: &str, rejection: UrlRejection, ctx: &DispatchContext<'_>) {
    ctx.warn(
        WarningKind::UrlRejected,
        format!("image source {:?} rejected: {}", raw, rejection),
        record.line,
    );
    record.rejected = Some(rejection.as_str());
}

impl Collector for ImagesCollector {
    fn name(&self) -> &str {
        "images"
    }

    fn on_token(
        &mut self,
        _index: usize,
        token: &Token,
        ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        if !token.is("inline") {
            return Ok(());
        }
        // images inside image alt text are images too
        let mut pending: Vec<&Token> = token.children.iter().rev().collect();
        while let Some(child) = pending.pop() {
            if child.is("image") {
                self.record(child, child.start_line().or(token.start_line()), ctx);
                pending.extend(child.children.iter().rev());
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        self.images.to_value()
    }

    fn truncated(&self) -> Option<usize> {
        self.images.truncated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{dispatch_with, output};
    use crate::security::SecurityPolicy;
    use serde_json::json;

    #[test]
    fn records_alt_src_and_title() {
        let images = output(
            ImagesCollector::new(10),
            "Intro\n\n![a *cat*](img/cat.png \"Cat\")\n",
        );
        assert_eq!(
            images,
            json!([{
                "alt": "a cat",
                "src": "img/cat.png",
                "title": "Cat",
                "line": 2,
                "data_uri": false
            }])
        );
    }

    #[test]
    fn small_data_uri_is_kept() {
        let images = output(
            ImagesCollector::new(10),
            "![dot](data:image/png;base64,iVBORw0K)\n",
        );
        assert_eq!(images[0]["data_uri"], json!(true));
        assert_eq!(images[0]["src"], "data:image/png;base64,iVBORw0K");
    }

    #[test]
    fn oversized_data_uri_is_dropped_with_warning() {
        let policy = SecurityPolicy {
            max_data_uri_bytes: 4,
            ..SecurityPolicy::default()
        };
        let report = dispatch_with(
            ImagesCollector::new(10),
            "![big](data:image/png;base64,AAAAAAAAAAAA)\n",
            &policy,
        );
        let image = &report.outputs["images"][0];
        assert_eq!(image["src"], Value::Null);
        assert_eq!(image["rejected"], "data_uri_over_budget");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::DataUriOverBudget);
    }

    #[test]
    fn non_image_data_uri_is_rejected() {
        let report = dispatch_with(
            ImagesCollector::new(10),
            "![x](data:text/html;base64,PHNjcmlwdD4=)\n",
            &SecurityPolicy::default(),
        );
        let image = &report.outputs["images"][0];
        assert_eq!(image["src"], Value::Null);
        assert_eq!(image["data_uri"], json!(true));
        assert_eq!(image["rejected"], "non_image_data_uri");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::UrlRejected);
    }

    #[test]
    fn bidi_override_in_data_uri_is_rejected() {
        let report = dispatch_with(
            ImagesCollector::new(10),
            "![y](data:image/png;base64,QUJD\u{202E}exe)\n",
            &SecurityPolicy::default(),
        );
        let image = &report.outputs["images"][0];
        assert_eq!(image["src"], Value::Null);
        assert_eq!(image["rejected"], "control_character");
        assert_eq!(report.warnings[0].kind, WarningKind::UrlRejected);
    }

    #[test]
    fn image_inside_link_is_found() {
        let images = output(
            ImagesCollector::new(10),
            "[![badge](https://ci.example/b.svg)](https://ci.example)\n",
        );
        assert_eq!(images[0]["src"], "https://ci.example/b.svg");
        assert_eq!(images[0]["alt"], "badge");
    }
}
