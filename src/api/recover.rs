use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode, header::CONNECTION},
};
use std::{any::Any, backtrace::Backtrace, sync::Once};
use tracing::error;

static PANIC_HOOK: Once = Once::new();

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload")
}

/// Log every panic with the location and a backtrace taken on the panicking
/// stack. Replaces the default stderr hook; later calls are no-ops.
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let backtrace = Backtrace::force_capture();
            let location = info
                .location()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            error!(
                panic = payload_message(info.payload()),
                location, "panicked\n{backtrace}"
            );
        }));
    });
}

/// Turn a handler panic into a 500 that also closes the connection.
///
/// The backtrace was already logged by the panic hook.
pub(crate) fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    error!(panic = payload_message(payload.as_ref()), "handler panicked");

    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panic_becomes_closing_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(CONNECTION),
            Some(&HeaderValue::from_static("close"))
        );
    }

    #[test]
    fn hook_logs_the_panicking_line() {
        install_panic_hook();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let line = tracing::subscriber::with_default(subscriber, || {
            let line = line!() + 1;
            let result = std::panic::catch_unwind(|| panic!("handler exploded"));
            assert!(result.is_err());
            line
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("handler exploded"));
        assert!(output.contains(&format!("src/api/recover.rs:{line}")));
        assert!(output.contains("panicked"));
    }
}
