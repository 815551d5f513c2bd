use crate::collector::{Collector, CollectorError};
use crate::dispatch::DispatchContext;
use mdscan_parser::{Token, Warehouse};
use serde_json::{json, Value};

/// The YAML front matter block, as JSON.
///
/// Reads the `front_matter` token of the one tokenized document. Output is `null` without
/// front matter, `{data, line}` when it parsed, `{error, line}` when it did not. A YAML
/// error is part of the output, not a collector failure.
#[derive(Default)]
pub struct FrontmatterCollector {
    output: Option<Value>,
}

impl FrontmatterCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

fn yaml_to_json(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
    serde_json::to_value(yaml).map_err(|e| e.to_string())
}

impl Collector for FrontmatterCollector {
    fn name(&self) -> &str {
        "frontmatter"
    }

    fn on_token(
        &mut self,
        _index: usize,
        token: &Token,
        _ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        if !token.is("front_matter") || self.output.is_some() {
            return Ok(());
        }
        let line = token.start_line();
        self.output = Some(match yaml_to_json(&token.content) {
            Ok(data) => json!({ "data": data, "line": line }),
            Err(error) => {
                log::debug!("front matter did not parse: {}", error);
                json!({ "error": error, "line": line })
            }
        });
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        Ok(self.output.take().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::output;

    #[test]
    fn parses_yaml_into_json() {
        let front = output(
            FrontmatterCollector::new(),
            "---\ntitle: Hello\ntags: [a, b]\ncount: 3\n---\n\n# Body\n",
        );
        assert_eq!(
            front["data"],
            json!({ "title": "Hello", "tags": ["a", "b"], "count": 3 })
        );
    }

    #[test]
    fn missing_front_matter_is_null() {
        assert_eq!(output(FrontmatterCollector::new(), "# Body\n"), Value::Null);
    }

    #[test]
    fn broken_yaml_is_reported_in_output() {
        let front = output(FrontmatterCollector::new(), "---\ntitle: [unclosed\n---\n\ntext\n");
        assert!(front["error"].is_string());
        assert!(front.get("data").is_none());
    }
}
