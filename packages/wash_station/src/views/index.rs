use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use maud::{DOCTYPE, PreEscaped, html};
use tracing::info;

use station_core::LogEvent;

use super::{CSS, JAVASCRIPT, state_panels};
use crate::AppState;

/// Station display. Every load counts as the display (re)starting.
pub async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    info!("Station page loaded");
    state.logger.dispatch(LogEvent::Initialized);

    let current = *state.current.borrow();

    let markup = html! {
        (DOCTYPE)
        html {
            head {
                title { "Wash Station" }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(CSS)) }
            }
            body {
                main id="station" {
                    (state_panels(current))
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    };

    Html(markup.into_string())
}
