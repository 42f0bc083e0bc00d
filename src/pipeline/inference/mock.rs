use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::{InferenceClient, InferenceParams};
use super::InferenceError;

/// A call observed by `MockInferenceClient`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub image_len: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

struct Route {
    marker: String,
    replies: VecDeque<Result<String, InferenceError>>,
}

/// Mock inference client for testing. Replies are scripted and routed by prompt.
///
/// Each route matches prompts containing its marker. Replies are consumed
/// in order; the last reply of a route repeats once the others are used up.
#[derive(Default)]
pub struct MockInferenceClient {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for prompts containing `marker`.
    pub fn respond(self, marker: &str, reply: &str) -> Self {
        self.push(marker, Ok(reply.to_string()))
    }

    /// Queue a failure for prompts containing `marker`.
    pub fn fail(self, marker: &str, error: InferenceError) -> Self {
        self.push(marker, Err(error))
    }

    fn push(self, marker: &str, reply: Result<String, InferenceError>) -> Self {
        {
            let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            match routes.iter_mut().find(|r| r.marker == marker) {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(Route {
                    marker: marker.to_string(),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls whose prompt contained `marker`.
    pub fn call_count(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.prompt.contains(marker))
            .count()
    }
}

impl InferenceClient for MockInferenceClient {
    fn infer(
        &self,
        prompt: &str,
        image: &[u8],
        params: &InferenceParams,
    ) -> Result<String, InferenceError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                prompt: prompt.to_string(),
                image_len: image.len(),
                temperature: params.temperature,
                max_tokens: params.max_tokens,
            });

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let route = routes
            .iter_mut()
            .find(|r| prompt.contains(&r.marker))
            .ok_or_else(|| InferenceError::ResponseParsing("no scripted reply for prompt".into()))?;

        if route.replies.len() > 1 {
            route
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(InferenceError::ResponseParsing("empty route".into())))
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Err(InferenceError::ResponseParsing("empty route".into())))
        }
    }
}
