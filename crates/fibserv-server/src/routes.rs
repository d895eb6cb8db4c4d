//! Request adapter: translate HTTP requests into task subscriptions.
//!
//! A request holds exactly one subscription on its task. If the caller
//! disconnects before completion, axum drops the handler future, the
//! guard below withdraws the subscription, and a task left without
//! waiters cancels its execution.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::debug;

use fibserv_core::{Algorithm, FibError};
use fibserv_orchestration::{Engine, Task, TaskOutcome, Waiter, WaiterId};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
}

/// Build the request router over an engine.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/{algorithm}", get(missing_index))
        .route("/{algorithm}/{n}", get(compute))
        .with_state(AppState { engine })
}

/// `/{algorithm}` without a term index is a parse failure, not a miss.
async fn missing_index(Path(algorithm): Path<String>) -> Response {
    let error = FibError::InvalidInput(format!("term index missing for {algorithm:?}"));
    (StatusCode::BAD_REQUEST, format!("{error}\n")).into_response()
}

/// Discovery page: every algorithm as a link to its 17th term.
async fn index() -> Html<String> {
    let mut body = String::from(
        "<!doctype html>\n<html><head><title>fibserv</title></head><body>\n\
         <h1>Sequence algorithms</h1>\n<ul>\n",
    );
    for algorithm in Algorithm::ALL {
        let name = algorithm.name();
        let _ = writeln!(body, "<li><a href=\"/{name}/17\">{name}</a></li>");
    }
    body.push_str("</ul>\n</body></html>\n");
    Html(body)
}

async fn compute(
    State(state): State<AppState>,
    Path((algorithm, n)): Path<(String, String)>,
) -> Response {
    // Both rejections happen before any task exists.
    let n: u64 = match n.parse() {
        Ok(n) => n,
        Err(parse_error) => {
            let error = FibError::InvalidInput(format!("term index {n:?}: {parse_error}"));
            return (StatusCode::BAD_REQUEST, format!("{error}\n")).into_response();
        }
    };
    let Some(algorithm) = Algorithm::from_name(&algorithm) else {
        let error = FibError::UnknownAlgorithm(algorithm);
        return (StatusCode::NOT_FOUND, format!("{error}\n")).into_response();
    };

    let (tx, rx) = tokio::sync::oneshot::channel::<TaskOutcome>();
    let waiter: Waiter = Box::new(move |outcome: &TaskOutcome| {
        let _ = tx.send(outcome.clone());
    });
    let (task, waiter_id) = match state.engine.request(algorithm, n, waiter) {
        Ok(subscribed) => subscribed,
        Err(error) => {
            return (StatusCode::SERVICE_UNAVAILABLE, format!("{error}\n")).into_response();
        }
    };
    let guard = SubscriptionGuard::new(task, waiter_id);

    match rx.await {
        Ok(outcome) => {
            guard.disarm();
            render(&outcome)
        }
        // The waiter was dropped unnotified; nothing left to report.
        Err(_) => {
            guard.disarm();
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

fn render(outcome: &TaskOutcome) -> Response {
    match outcome {
        TaskOutcome::Value(value) => value.to_string().into_response(),
        TaskOutcome::Failed(error) => {
            (StatusCode::INTERNAL_SERVER_ERROR, error_page(error)).into_response()
        }
        // Administrative cancellation is not an error; send nothing.
        TaskOutcome::Cancelled => StatusCode::NO_CONTENT.into_response(),
    }
}

fn error_page(error: &FibError) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><body><h1>computation failed</h1>\n<p>{error}</p>\n</body></html>\n"
    ))
}

/// Withdraws the request's subscription when the handler future is
/// dropped before the outcome arrived (caller disconnect).
struct SubscriptionGuard {
    task: Arc<Task>,
    waiter: WaiterId,
    armed: bool,
}

impl SubscriptionGuard {
    fn new(task: Arc<Task>, waiter: WaiterId) -> Self {
        Self {
            task,
            waiter,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!(task = %self.task.key(), "caller went away; withdrawing interest");
            self.task.unsubscribe(self.waiter);
        }
    }
}
