//! Operations by name, for hosts that pass untyped values
//!
//! Arguments arrive as `serde_json::Value`s and are checked for count and
//! type before anything touches the subsystem. Results go back the same
//! way: a context is a string, no context is `""`, and an error is an
//! object with `code`, `errno` and `message`.

use std::fmt;
use std::os::fd::RawFd;
use std::str::FromStr;
use std::sync::Arc;

use seclabel_dispatch::{DispatchInput, Operation, RequestId};
use seclabel_errors::{LabelError, UserFacingError};
use seclabel_platform::codec;
use serde_json::{json, Value};

use crate::SELinux;

/// Host callback, invoked as `(error, result)` with exactly one of the two
/// non-null
pub type HostCallback = Box<dyn FnOnce(Value, Value) + Send + 'static>;

/// Names in the host method table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GetCon,
    GetConRaw,
    GetFileCon,
    LGetFileCon,
    GetPeerCon,
    MatchPathCon,
    SetExecCon,
    SetFsCreateCon,
    SetSockCreateCon,
}

impl Method {
    pub const ALL: [Self; 9] = [
        Self::GetCon,
        Self::GetConRaw,
        Self::GetFileCon,
        Self::LGetFileCon,
        Self::GetPeerCon,
        Self::MatchPathCon,
        Self::SetExecCon,
        Self::SetFsCreateCon,
        Self::SetSockCreateCon,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GetCon => "getcon",
            Self::GetConRaw => "getcon_raw",
            Self::GetFileCon => "getfilecon",
            Self::LGetFileCon => "lgetfilecon",
            Self::GetPeerCon => "getpeercon",
            Self::MatchPathCon => "matchpathcon",
            Self::SetExecCon => "setexeccon",
            Self::SetFsCreateCon => "setfscreatecon",
            Self::SetSockCreateCon => "setsockcreatecon",
        }
    }

    /// Whether the method reports through a callback
    #[must_use]
    pub fn is_async(self) -> bool {
        matches!(self, Self::GetPeerCon | Self::MatchPathCon)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = LabelError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.name() == name)
            .ok_or_else(|| LabelError::invalid_argument(format!("Unknown method {name}")))
    }
}

/// Host representation of an error
#[must_use]
pub fn error_value(err: &LabelError) -> Value {
    json!({
        "code": err.user_code(),
        "errno": err.errno(),
        "message": err.user_message(),
    })
}

fn wrong_arity() -> LabelError {
    LabelError::invalid_argument("Wrong number of arguments")
}

fn path_arg(args: &[Value]) -> Result<&str, LabelError> {
    let value = args.first().ok_or_else(wrong_arity)?;
    value
        .as_str()
        .ok_or_else(|| LabelError::invalid_argument("Wrong argument type"))
}

/// A socket is given as its descriptor number or as an object with an `fd`
/// field.
fn fd_arg(args: &[Value]) -> Result<RawFd, LabelError> {
    let value = args.first().ok_or_else(wrong_arity)?;
    value
        .as_i64()
        .or_else(|| value.get("fd").and_then(Value::as_i64))
        .and_then(|fd| RawFd::try_from(fd).ok())
        .ok_or_else(|| LabelError::invalid_argument("Must supply a filedescriptor."))
}

impl SELinux {
    /// Run a synchronous method
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown or async method, a missing
    /// argument or one of the wrong type; otherwise the operation's error.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, LabelError> {
        let method: Method = method.parse()?;
        tracing::trace!(%method, argc = args.len(), "host call");

        let context = match method {
            Method::GetCon => self.get_context()?,
            Method::GetConRaw => self.get_context_raw()?,
            Method::GetFileCon => self.get_file_context(path_arg(args)?)?,
            Method::LGetFileCon => self.get_link_context(path_arg(args)?)?,
            Method::SetExecCon | Method::SetFsCreateCon | Method::SetSockCreateCon => {
                self.set_from_value(method, args)?;
                return Ok(Value::Null);
            }
            Method::GetPeerCon | Method::MatchPathCon => {
                return Err(LabelError::invalid_argument(format!(
                    "{method} requires a callback"
                )));
            }
        };
        Ok(codec::to_value(context))
    }

    /// `null` resets the attribute; anything else must be a string.
    fn set_from_value(&self, method: Method, args: &[Value]) -> Result<(), LabelError> {
        let value = args
            .first()
            .ok_or_else(|| LabelError::invalid_argument("Must supply a security context."))?;
        let context = if value.is_null() {
            None
        } else {
            Some(codec::encode_value(value)?)
        };
        let context = context.as_deref();

        match method {
            Method::SetExecCon => self.ops.set_exec_context(context),
            Method::SetFsCreateCon => self.ops.set_fs_create_context(context),
            _ => self.ops.set_sock_create_context(context),
        }
    }

    /// Start an async method whose result is passed to `callback` on the
    /// scheduler.
    ///
    /// Argument errors are delivered to the callback like any other failure.
    ///
    /// # Errors
    ///
    /// Only when there is no callback to deliver to, or `method` is not an
    /// async method.
    pub fn call_async(
        self: &Arc<Self>,
        method: &str,
        args: &[Value],
        callback: Option<HostCallback>,
    ) -> Result<RequestId, LabelError> {
        let method: Method = method.parse()?;
        let operation = match method {
            Method::GetPeerCon => Operation::ResolvePeerContext,
            Method::MatchPathCon => Operation::ResolvePathContext,
            _ => {
                return Err(LabelError::invalid_argument(format!(
                    "{method} does not take a callback"
                )))
            }
        };
        let callback =
            callback.ok_or_else(|| LabelError::invalid_argument("Argument 1 must be a function"))?;
        tracing::trace!(%method, argc = args.len(), "host async call");

        let input = match operation {
            Operation::ResolvePeerContext => fd_arg(args).map(DispatchInput::Socket),
            _ => path_arg(args).map(|path| DispatchInput::Path(path.to_string())),
        };

        let completion = Box::new(move |outcome: seclabel_dispatch::Outcome| match outcome {
            Ok(context) => callback(Value::Null, codec::to_value(context)),
            Err(err) => callback(error_value(&err), Value::Null),
        });
        let owner = Arc::clone(self) as Arc<dyn seclabel_dispatch::Owner>;

        Ok(match input {
            Ok(input) => self.dispatcher.dispatch(owner, operation, input, completion),
            Err(err) => self.dispatcher.reject(owner, operation, err, completion),
        })
    }
}
