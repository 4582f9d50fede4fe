//! Scripted [`CommandRunner`] for tests
//!
//! Records every invocation and answers from handlers. Handlers registered
//! later take precedence, so a test can install broad defaults first and
//! override specific commands afterwards. Unmatched invocations succeed with
//! empty output.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::exec::{CommandRunner, Invocation};
use crate::{Error, Result};

type Handler = Box<dyn Fn(&Invocation) -> Option<Result<String>> + Send + Sync>;

/// Recording runner with programmable responses
#[derive(Default)]
pub struct ScriptedRunner {
    handlers: Mutex<Vec<Handler>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    /// Create an empty runner
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler; `None` passes the invocation to older handlers
    pub fn on<F>(&self, handler: F)
    where
        F: Fn(&Invocation) -> Option<Result<String>> + Send + Sync + 'static,
    {
        self.handlers.lock().push(Box::new(handler));
    }

    /// Answer `program` invocations containing `args` with `output`
    pub fn respond(&self, program: &str, args: &[&str], output: &str) {
        let program = program.to_string();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let output = output.to_string();
        self.on(move |inv| {
            matches(inv, &program, &args).then(|| Ok(output.clone()))
        });
    }

    /// Fail `program` invocations containing `args` with `stderr`
    pub fn fail(&self, program: &str, args: &[&str], stderr: &str) {
        let program = program.to_string();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let stderr = stderr.to_string();
        self.on(move |inv| {
            matches(inv, &program, &args)
                .then(|| Err(Error::command_failed(inv.to_string(), stderr.clone())))
        });
    }

    /// Every invocation so far, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    /// Invocations of `program` containing `args`
    pub fn calls_matching(&self, program: &str, args: &[&str]) -> Vec<Invocation> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.calls
            .lock()
            .iter()
            .filter(|inv| matches(inv, program, &args))
            .cloned()
            .collect()
    }

    /// Index of the first invocation of `program` containing `args`
    pub fn position(&self, program: &str, args: &[&str]) -> Option<usize> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.calls
            .lock()
            .iter()
            .position(|inv| matches(inv, program, &args))
    }
}

fn matches(inv: &Invocation, program: &str, args: &[String]) -> bool {
    let seq: Vec<&str> = args.iter().map(String::as_str).collect();
    inv.program == program && (seq.is_empty() || inv.has_args(&seq))
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String> {
        self.calls.lock().push(invocation.clone());
        let handlers = self.handlers.lock();
        for handler in handlers.iter().rev() {
            if let Some(result) = handler(invocation) {
                return result;
            }
        }
        Ok(String::new())
    }
}
