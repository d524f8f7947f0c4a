//! Logger proxy used by the legacy transport.
//!
//! Emits are notifications: the plugin never waits for the host to write a
//! line, and a broken link drops the line instead of failing the backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::logical::{Context, LogLevel, Logger};
use crate::rpc::{decode_body, encode_body, RpcClient, RpcStatus, Service};

pub const METHOD_LOG: &str = "Logger.Log";
pub const METHOD_SET_LEVEL: &str = "Logger.SetLevel";
pub const METHOD_IS_ENABLED: &str = "Logger.IsEnabled";

#[derive(Debug, Serialize, Deserialize)]
pub struct LogArgs {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LevelArgs {
    pub level: LogLevel,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IsEnabledReply {
    pub enabled: bool,
}

#[derive(Clone)]
pub struct LoggerClient {
    rpc: RpcClient,
}

impl LoggerClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn close(&self) {
        self.rpc.close();
    }
}

#[async_trait]
impl Logger for LoggerClient {
    fn log(&self, level: LogLevel, message: &str) {
        let args = LogArgs { level, message: message.to_string() };
        if let Err(e) = self.rpc.notify(METHOD_LOG, &args) {
            debug!(error = %e, "Dropping plugin log line");
        }
    }

    async fn is_enabled(&self, level: LogLevel) -> bool {
        let args = LevelArgs { level };
        match self.rpc.call::<_, IsEnabledReply>(METHOD_IS_ENABLED, &args).await
        {
            Ok(reply) => reply.enabled,
            Err(e) => {
                debug!(error = %e, "Logger level query failed");
                false
            }
        }
    }

    fn set_level(&self, level: LogLevel) {
        if let Err(e) = self.rpc.notify(METHOD_SET_LEVEL, &LevelArgs { level }) {
            debug!(error = %e, "Dropping logger level change");
        }
    }
}

pub struct LoggerServer {
    logger: Arc<dyn Logger>,
}

impl LoggerServer {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Service for LoggerServer {
    fn name(&self) -> &'static str {
        "logger"
    }

    async fn call(&self, _ctx: Context, method: &str, body: Value) -> Result<Value, RpcStatus> {
        match method {
            METHOD_IS_ENABLED => {
                let args: LevelArgs = decode_body(body)?;
                encode_body(&IsEnabledReply { enabled: self.logger.is_enabled(args.level).await })
            }
            other => Err(RpcStatus::unknown_method(other)),
        }
    }

    async fn notify(&self, method: &str, body: Value) {
        match method {
            METHOD_LOG => match decode_body::<LogArgs>(body) {
                Ok(args) => self.logger.log(args.level, &args.message),
                Err(e) => debug!(error = %e.message, "Malformed log notification"),
            },
            METHOD_SET_LEVEL => match decode_body::<LevelArgs>(body) {
                Ok(args) => self.logger.set_level(args.level),
                Err(e) => debug!(error = %e.message, "Malformed level notification"),
            },
            other => debug!(method = other, "Ignoring unknown logger notification"),
        }
    }
}
