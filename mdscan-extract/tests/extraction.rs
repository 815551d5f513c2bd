//! End-to-end behaviour of the protected parse.

use mdscan_extract::{
    shared, Collector, CollectorError, CollectorRegistry, DispatchContext, ExtractOptions,
    Extractor, IsolationMode, ParseOutcome, TimeoutStage, WarningKind,
};
use mdscan_parser::{Token, Warehouse};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn options(profile: &str) -> ExtractOptions {
    let config = mdscan_config::load_defaults().unwrap();
    ExtractOptions::from_config(&config, profile).unwrap()
}

fn completed(outcome: ParseOutcome) -> mdscan_extract::ExtractionResult {
    match outcome {
        ParseOutcome::Completed(result) => result,
        ParseOutcome::TimedOut(report) => panic!("unexpected timeout: {:?}", report),
    }
}

#[test]
fn links_cap_truncates_and_counts() {
    let config = mdscan_config::Loader::new()
        .set_profile_value("moderate", "caps.links", 2)
        .unwrap()
        .build()
        .unwrap();
    let options = ExtractOptions::from_config(&config, "moderate").unwrap();
    let markdown = "[a](https://a.example) [b](/b) [c](#c) [d](/d)\n\n[e](mailto:e@example.com)\n";

    let result = completed(Extractor::new(options).extract_default(markdown).unwrap());
    assert_eq!(result.collectors["links"].as_array().unwrap().len(), 2);
    assert_eq!(result.collectors["links_truncated"], json!(true));
    assert_eq!(result.collectors["links_truncated_count"], json!(5));
    assert_eq!(result.metadata.truncated.get("links"), Some(&5));
    assert!(!result.is_truncated("images"));
}

#[test]
fn header_injection_url_is_rejected() {
    let markdown = "[x](http://evil.com%0A%0DSet-Cookie:admin=true)\n";
    let result = completed(
        Extractor::new(options("moderate"))
            .extract_default(markdown)
            .unwrap(),
    );
    let link = &result.collectors["links"][0];
    assert_eq!(link["url"], Value::Null);
    assert_eq!(link["rejected"], "control_character");
    assert_eq!(result.metadata.warning_counts.get("url_rejected"), Some(&1));
    assert_eq!(result.metadata.warnings[0].kind, WarningKind::UrlRejected);
}

#[test]
fn deep_nesting_does_not_overflow() {
    let depth = 5_000;
    let markdown = format!("{}quoted\n\n{}item\n", "> ".repeat(depth), "- ".repeat(depth));
    let result = completed(
        Extractor::new(options("moderate"))
            .extract_default(&markdown)
            .unwrap(),
    );
    assert!(result.metadata.collector_errors.is_empty());
    let lists = result.collectors["lists"].as_array().unwrap();
    assert_eq!(lists[0]["depth"], 0);
    assert_eq!(lists[1]["depth"], 1);
    // every kept list sits inside all the earlier ones
    let last = lists.last().unwrap();
    assert_eq!(last["depth"], json!(lists.len() - 1));
    assert!(result.collectors["plain_text"]["text"]
        .as_str()
        .unwrap()
        .contains("quoted"));
}

#[test]
fn dispatch_order_is_stable_across_runs() {
    let markdown = "# T\n\n- [a](/a)\n\n| x |\n|---|\n| 1 |\n";
    let extractor = Extractor::new(options("moderate"));
    let first = completed(extractor.extract_default(markdown).unwrap());
    for _ in 0..20 {
        let again = completed(extractor.extract_default(markdown).unwrap());
        assert_eq!(again.metadata.dispatch_order, first.metadata.dispatch_order);
        assert_eq!(again.collectors, first.collectors);
    }
}

#[test]
fn every_built_in_section_is_present() {
    let markdown = "---\ntitle: Doc\n---\n\n# Intro\n\n\
                    Text with ![pic](p.png).\n\n```sh\nls\n```\n";
    let result = completed(
        Extractor::new(options("permissive"))
            .extract_default(markdown)
            .unwrap(),
    );
    for name in [
        "links",
        "images",
        "headings",
        "code_blocks",
        "tables",
        "lists",
        "html",
        "frontmatter",
        "plain_text",
    ] {
        assert!(result.collectors.contains_key(name), "missing {}", name);
    }
    assert_eq!(result.collectors["frontmatter"]["data"]["title"], "Doc");
    assert_eq!(result.collectors["code_blocks"][0]["language"], "sh");
    assert_eq!(result.collectors["headings"]["headings"][0]["text"], "Intro");
}

/// Counts tokens; shared so the test can see what it was given.
struct Counter {
    seen: Arc<Mutex<usize>>,
}

impl Collector for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn on_token(
        &mut self,
        _index: usize,
        _token: &Token,
        _ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        *self.seen.lock().unwrap() += 1;
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        Ok(Value::from(*self.seen.lock().unwrap()))
    }
}

#[test]
fn registering_twice_dispatches_once() {
    let seen = Arc::new(Mutex::new(0));
    let counter = shared(Counter { seen: seen.clone() });
    let mut registry = CollectorRegistry::new();
    registry.register(counter.clone()).unwrap();
    registry.register(counter).unwrap();

    let result = completed(
        Extractor::new(options("moderate"))
            .extract("# a\n\nb\n", registry)
            .unwrap(),
    );
    assert_eq!(result.metadata.token_count, 6);
    assert_eq!(result.collectors["counter"], json!(6));
}

/// Sleeps on every token.
struct Sluggish;

impl Collector for Sluggish {
    fn name(&self) -> &str {
        "sluggish"
    }

    fn on_token(
        &mut self,
        _index: usize,
        _token: &Token,
        _ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        Ok(Value::Null)
    }
}

#[test]
fn slow_parse_times_out_near_budget() {
    let mut options = options("moderate");
    options.timeout = Duration::from_millis(300);
    let mut registry = CollectorRegistry::new();
    registry.register(shared(Sluggish)).unwrap();
    let markdown = "paragraph\n\n".repeat(500);

    let started = Instant::now();
    let outcome = Extractor::new(options).extract(&markdown, registry).unwrap();
    let elapsed = started.elapsed();

    match outcome {
        ParseOutcome::TimedOut(report) => {
            assert_eq!(report.stage, TimeoutStage::Dispatch);
            assert_eq!(report.isolation, IsolationMode::Thread);
            assert_eq!(report.budget_ms, 300.0);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
}

#[cfg(unix)]
mod process {
    use super::*;
    use mdscan_extract::worker::handle_request;
    use mdscan_extract::{ExtractError, WorkerCommand, WorkerRequest};
    use std::io::Write;

    #[test]
    fn hung_worker_times_out_in_tokenize() {
        let mut options = options("strict");
        options.timeout = Duration::from_millis(200);
        let extractor =
            Extractor::new(options).with_worker(WorkerCommand::new("sleep").arg("30"));

        let started = Instant::now();
        let outcome = extractor.extract_default("# hi\n").unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        match outcome {
            ParseOutcome::TimedOut(report) => {
                assert_eq!(report.stage, TimeoutStage::Tokenize);
                assert_eq!(report.isolation, IsolationMode::Process);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn worker_tokens_are_indexed_and_dispatched_here() {
        let response = json!({
            "tokens": [
                { "type": "heading_open", "tag": "h1", "nesting": 1, "map": [0, 1], "markup": "#" },
                { "type": "inline", "nesting": 0, "map": [0, 1], "content": "From worker" },
                { "type": "text", "nesting": 0, "content": "From worker" },
                { "type": "heading_close", "tag": "h1", "nesting": -1 }
            ],
            "child_counts": [0, 1, 0, 0]
        });
        let script = format!("cat >/dev/null; printf '%s' '{}'", response);
        let extractor = Extractor::new(options("strict"))
            .with_worker(WorkerCommand::new("sh").arg("-c").arg(script));

        let result = completed(extractor.extract_default("ignored\n").unwrap());
        assert_eq!(result.metadata.isolation, IsolationMode::Process);
        assert_eq!(result.collectors["headings"]["headings"][0]["text"], "From worker");
    }

    #[test]
    fn deeply_nested_images_survive_the_worker_pipe() {
        let depth = 120;
        let mut text = String::from("para ");
        text.push_str(&"![".repeat(depth));
        text.push('x');
        for i in 0..depth {
            text.push_str(&format!("](i{}.png)", i));
        }
        text.push('\n');

        // what a real worker would answer for this text
        let response = handle_request(WorkerRequest {
            text: text.clone(),
            options: options("strict").tokenizer,
        })
        .unwrap();
        let mut canned = tempfile::NamedTempFile::new().unwrap();
        serde_json::to_writer(&mut canned, &response).unwrap();
        canned.flush().unwrap();
        let script = format!("cat >/dev/null; cat '{}'", canned.path().display());

        let extractor = Extractor::new(options("strict"))
            .with_worker(WorkerCommand::new("sh").arg("-c").arg(script));
        let process = completed(extractor.extract_default(&text).unwrap());
        let mut threaded = options("strict");
        threaded.process_isolation = false;
        let thread = completed(Extractor::new(threaded).extract_default(&text).unwrap());

        assert_eq!(process.metadata.isolation, IsolationMode::Process);
        assert_eq!(process.collectors["images"], thread.collectors["images"]);
        assert!(!process.collectors["images"].as_array().unwrap().is_empty());
    }

    #[test]
    fn unbalanced_worker_tokens_are_a_structural_error() {
        let script =
            r#"cat >/dev/null; echo '{"tokens":[{"type":"paragraph_close","nesting":-1}]}'"#;
        let extractor = Extractor::new(options("strict"))
            .with_worker(WorkerCommand::new("sh").arg("-c").arg(script));
        let err = extractor.extract_default("x\n").unwrap_err();
        assert!(matches!(err, ExtractError::Structural(_)), "{:?}", err);
    }
}
