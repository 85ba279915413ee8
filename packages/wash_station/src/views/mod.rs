mod index;

pub use index::index_page;

use maud::{Markup, html};
use station_core::StationState;

/// Headline and prompt shown for each state. `Sleeping` is a blank screen.
fn panel_text(state: StationState) -> Option<(&'static str, &'static str)> {
    match state {
        StationState::Init | StationState::Idle => {
            Some(("Wash your hands", "Wave under the sensor to start"))
        }
        StationState::InWash => Some(("Keep scrubbing", "Hands under the tap until the timer ends")),
        StationState::Done => Some(("All clean", "Thanks for washing up")),
        StationState::Sleeping => None,
    }
}

/// One panel per state; the page script shows whichever matches the stream.
pub fn state_panels(initial: StationState) -> Markup {
    html! {
        @for state in StationState::ALL {
            section class="panel" data-state=(state.wire_name()) hidden[state != initial] {
                @if let Some((headline, prompt)) = panel_text(state) {
                    h1 { (headline) }
                    p { (prompt) }
                }
            }
        }
    }
}

// Shared CSS constant
pub const CSS: &str = r#"
    html, body {
        margin: 0;
        height: 100%;
        background: #0a0e1a;
        color: #e2e8f0;
        font-family: system-ui, sans-serif;
    }

    .panel {
        display: flex;
        flex-direction: column;
        align-items: center;
        justify-content: center;
        height: 100vh;
        animation: fadeIn 0.3s ease-in;
    }

    .panel[hidden] {
        display: none;
    }

    .panel[data-state="BLACK"] {
        background: #000;
    }

    .panel h1 {
        font-size: 4rem;
        margin: 0 0 1rem;
    }

    @keyframes fadeIn {
        from { opacity: 0; }
        to { opacity: 1; }
    }
"#;

// Swaps the visible panel on every state event
pub const JAVASCRIPT: &str = r#"
    const source = new EventSource('/stream');
    source.onmessage = (event) => {
        const next = event.data.trim();
        for (const panel of document.querySelectorAll('.panel')) {
            panel.hidden = panel.dataset.state !== next;
        }
    };
"#;
