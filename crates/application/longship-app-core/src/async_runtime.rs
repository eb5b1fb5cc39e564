use std::sync::OnceLock;

use crate::ControllerError;

static RUNTIME: OnceLock<std::result::Result<tokio::runtime::Runtime, String>> = OnceLock::new();

/// Process-wide runtime shared by sync workers and background pollers.
pub(crate) fn runtime() -> Result<&'static tokio::runtime::Runtime, ControllerError> {
    let rt = RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .thread_name("longship-rt")
            .enable_all()
            .build()
            .map_err(|e| e.to_string())
    });
    match rt {
        Ok(rt) => Ok(rt),
        Err(message) => Err(ControllerError::Runtime(message.clone())),
    }
}
