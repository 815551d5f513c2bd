//! Worker protocol
//!
//! What crosses the process boundary is plain data: the text and the tokenizer options in,
//! the token list out. The worker side rebuilds the tokenizer from the options on every
//! request and keeps no state between them.
//!
//! Inline children are flattened on the wire: every token is sent in pre-order with its
//! `children` emptied, and `child_counts` says how many of the following tokens belong to
//! it. The JSON nesting depth therefore stays fixed however deeply the document nests
//! inline content such as images inside image alt text.

use crate::error::ExtractError;
use mdscan_parser::transforms::stages::{Normalize, Tokenize};
use mdscan_parser::transforms::Transform;
use mdscan_parser::{Token, TokenStream, TokenizerOptions};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub text: String,
    pub options: TokenizerOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireResponse", try_from = "WireResponse")]
pub struct WorkerResponse {
    pub tokens: TokenStream,
}

/// [`WorkerResponse`] as it is written to the pipe.
#[derive(Debug, Serialize, Deserialize)]
struct WireResponse {
    tokens: Vec<Token>,
    /// Child count per token, parallel to `tokens`. Missing means no token has children.
    #[serde(default)]
    child_counts: Vec<usize>,
}

impl From<WorkerResponse> for WireResponse {
    fn from(response: WorkerResponse) -> Self {
        let mut tokens = Vec::new();
        let mut child_counts = Vec::new();
        let mut pending: Vec<Token> = response.tokens.into_iter().rev().collect();
        while let Some(mut token) = pending.pop() {
            let children = std::mem::take(&mut token.children);
            child_counts.push(children.len());
            tokens.push(token);
            pending.extend(children.into_iter().rev());
        }
        WireResponse {
            tokens,
            child_counts,
        }
    }
}

impl TryFrom<WireResponse> for WorkerResponse {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        if !wire.child_counts.is_empty() && wire.child_counts.len() != wire.tokens.len() {
            return Err(format!(
                "{} child counts for {} tokens",
                wire.child_counts.len(),
                wire.tokens.len()
            ));
        }
        let mut roots = Vec::new();
        // tokens still waiting for children, with how many are left
        let mut open: Vec<(Token, usize)> = Vec::new();
        for (idx, token) in wire.tokens.into_iter().enumerate() {
            if !token.children.is_empty() {
                return Err(format!("token {} carries nested children", idx));
            }
            let count = wire.child_counts.get(idx).copied().unwrap_or(0);
            open.push((token, count));
            while open.last().is_some_and(|(_, left)| *left == 0) {
                let Some((done, _)) = open.pop() else { break };
                match open.last_mut() {
                    Some((parent, left)) => {
                        parent.children.push(done);
                        *left -= 1;
                    }
                    None => roots.push(done),
                }
            }
        }
        if !open.is_empty() {
            return Err("token list ends inside a child list".to_string());
        }
        Ok(WorkerResponse { tokens: roots })
    }
}

/// Tokenize one request.
pub fn handle_request(request: WorkerRequest) -> Result<WorkerResponse, ExtractError> {
    let pipeline = Transform::<String, String>::from_fn(Ok)
        .then(Normalize)
        .then(Tokenize::new(request.options));
    let document = pipeline.run(request.text)?;
    Ok(WorkerResponse {
        tokens: document.tokens,
    })
}

/// Serve a single request: read JSON from `input` until EOF, write JSON to `output`.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> Result<(), ExtractError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let request: WorkerRequest =
        serde_json::from_slice(&raw).map_err(|e| ExtractError::MalformedRequest(e.to_string()))?;
    let response = handle_request(request)?;
    serde_json::to_writer(&mut output, &response).map_err(std::io::Error::from)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_request_with_its_own_options() {
        let response = handle_request(WorkerRequest {
            text: "| a | b |\r\n|---|---|\r\n".to_string(),
            options: TokenizerOptions {
                gfm: false,
                ..TokenizerOptions::default()
            },
        })
        .unwrap();
        assert!(response.tokens.iter().all(|t| !t.is("table_open")));
        assert_eq!(response.tokens[0].kind, "paragraph_open");
    }

    #[test]
    fn serves_json_over_streams() {
        let request = WorkerRequest {
            text: "# Title\n".to_string(),
            options: TokenizerOptions::default(),
        };
        let input = serde_json::to_vec(&request).unwrap();
        let mut output = Vec::new();
        serve(input.as_slice(), &mut output).unwrap();

        let response: WorkerResponse = serde_json::from_slice(&output).unwrap();
        assert_eq!(response.tokens[0].kind, "heading_open");
        assert_eq!(response.tokens[1].content, "Title");
    }

    #[test]
    fn children_are_flat_on_the_wire() {
        let request = WorkerRequest {
            text: "a *b* c\n".to_string(),
            options: TokenizerOptions::default(),
        };
        let response = handle_request(request).unwrap();
        let wire = serde_json::to_value(&response).unwrap();
        let tokens = wire["tokens"].as_array().unwrap();
        assert!(tokens.iter().all(|t| t["children"].as_array().unwrap().is_empty()));
        assert_eq!(
            tokens.len(),
            wire["child_counts"].as_array().unwrap().len()
        );

        let back: WorkerResponse = serde_json::from_value(wire).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn nested_images_stay_below_the_json_depth_limit() {
        let depth = 150;
        let mut text = String::from("para ");
        text.push_str(&"![".repeat(depth));
        text.push('x');
        for i in 0..depth {
            text.push_str(&format!("](i{}.png)", i));
        }
        text.push('\n');
        let response = handle_request(WorkerRequest {
            text,
            options: TokenizerOptions::default(),
        })
        .unwrap();

        let bytes = serde_json::to_vec(&response).unwrap();
        let back: WorkerResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn inconsistent_child_counts_are_rejected() {
        let short = r#"{"tokens":[{"type":"inline","nesting":0}],"child_counts":[1]}"#;
        assert!(serde_json::from_str::<WorkerResponse>(short).is_err());
        let mismatched = r#"{"tokens":[{"type":"hr","nesting":0}],"child_counts":[0,0]}"#;
        assert!(serde_json::from_str::<WorkerResponse>(mismatched).is_err());
    }

    #[test]
    fn rejects_garbage_requests() {
        let err = serve(&b"not json"[..], Vec::new()).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedRequest(_)));
    }

    #[test]
    fn tokenizer_limits_apply_in_the_worker() {
        let request = WorkerRequest {
            text: "too long".to_string(),
            options: TokenizerOptions {
                max_input_bytes: Some(2),
                ..TokenizerOptions::default()
            },
        };
        assert!(matches!(
            handle_request(request),
            Err(ExtractError::Pipeline(_))
        ));
    }
}
