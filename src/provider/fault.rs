//! Fault reporting from the EC2 client
//!
//! A [`FaultListener`] receives provider-side faults that never reach the
//! discovery caller as errors, such as raw error bodies. The engine hands a
//! [`FaultReporter`] to the client at start; the client reports each fault
//! together with the request that produced it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use super::model::DescribeInstancesRequest;

/// Receives fault messages from the EC2 client
pub trait FaultListener: Send + Sync {
    fn fault(&self, message: &str);
}

impl<F> FaultListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn fault(&self, message: &str) {
        self(message)
    }
}

/// Forwards faults to the `tracing` warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultListener;

impl FaultListener for TracingFaultListener {
    fn fault(&self, message: &str) {
        warn!(target: "ec2_discovery::fault", "{}", message);
    }
}

/// The in-flight request a fault belongs to
#[derive(Debug, Clone, Copy)]
pub struct FaultContext<'a> {
    pub request: &'a DescribeInstancesRequest,
}

impl<'a> FaultContext<'a> {
    pub fn new(request: &'a DescribeInstancesRequest) -> Self {
        Self { request }
    }
}

/// Formats faults and dispatches them to a listener, never failing itself
#[derive(Clone)]
pub struct FaultReporter {
    listener: Arc<dyn FaultListener>,
}

impl fmt::Debug for FaultReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultReporter")
            .field("listener", &"<FaultListener>")
            .finish()
    }
}

impl FaultReporter {
    pub fn new(listener: Arc<dyn FaultListener>) -> Self {
        Self { listener }
    }

    /// Report a provider error body for the given request.
    ///
    /// A panicking listener is contained here and the message is dropped.
    pub fn report(&self, context: FaultContext<'_>, body: &str) {
        let listener = &self.listener;
        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| {
            let message = format!(
                "AWS Exception: [{}] For request [{}]",
                body, context.request
            );
            listener.fault(&message);
        }));
        if dispatched.is_err() {
            tracing::debug!("Fault listener panicked; fault discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_formats_body_and_request() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        let reporter = FaultReporter::new(Arc::new(move |message: &str| {
            sink.lock().unwrap().push(message.to_string());
        }));

        let request = DescribeInstancesRequest::new().with_instance_ids(["i-abc"]);
        reporter.report(FaultContext::new(&request), "<Error>Denied</Error>");

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            ["AWS Exception: [<Error>Denied</Error>] For request [DescribeInstances(InstanceIds=[i-abc])]"]
        );
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let reporter = FaultReporter::new(Arc::new(|_: &str| panic!("listener failure")));
        let request = DescribeInstancesRequest::new();
        reporter.report(FaultContext::new(&request), "body");
    }

    #[test]
    fn test_tracing_listener_accepts_messages() {
        let reporter = FaultReporter::new(Arc::new(TracingFaultListener));
        let request = DescribeInstancesRequest::new();
        reporter.report(FaultContext::new(&request), "body");
    }
}
