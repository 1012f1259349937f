//! Streamed CSV download of the full history.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Response, header},
    routing::get,
};
use futures::stream::{self, Stream};
use geiger_store::{DEFAULT_PAGE_SIZE, PageCursor, encode_csv_page};
use tracing::{debug, error};

use crate::api::AppError;
use crate::state::AppState;

/// File name offered to the browser.
pub const DOWNLOAD_FILENAME: &str = "geiger.csv";

/// Create the download router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download", get(download))
}

#[derive(Debug, Clone, Copy)]
enum Position {
    Start,
    After(PageCursor),
    Done,
}

/// CSV chunks for the whole table, one per storage page.
///
/// The store lock is taken for each page and released before the chunk is
/// sent. The first chunk always carries the header, even for an empty table.
fn csv_chunks(
    state: Arc<AppState>,
    page_size: u32,
) -> impl Stream<Item = Result<Vec<u8>, geiger_store::Error>> {
    let page_size = page_size.max(1);
    stream::unfold(Position::Start, move |position| {
        let state = Arc::clone(&state);
        async move {
            let cursor = match position {
                Position::Done => return None,
                Position::Start => None,
                Position::After(cursor) => Some(cursor),
            };

            let page = match state.store.lock().await.page_after(cursor, page_size) {
                Ok(page) => page,
                Err(e) => {
                    error!("CSV export aborted: {}", e);
                    return Some((Err(e), Position::Done));
                }
            };

            let first = cursor.is_none();
            if page.is_empty() && !first {
                return None;
            }

            let next = match page.last() {
                Some(last) if page.len() == page_size as usize => Position::After(last.cursor()),
                _ => Position::Done,
            };

            debug!("CSV export page of {} rows", page.len());
            Some((encode_csv_page(&page, first), next))
        }
    })
}

/// Stream every reading as CSV.
async fn download(State(state): State<Arc<AppState>>) -> Result<Response<Body>, AppError> {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/csv")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", DOWNLOAD_FILENAME),
        )
        .body(Body::from_stream(csv_chunks(state, DEFAULT_PAGE_SIZE)))
        .map_err(|e| AppError::Internal(e.to_string()))
}
