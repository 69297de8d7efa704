//! Greeting renderer: signals readiness, dispatches the open call and
//! writes the identity greeting into the `#app` element.

use crate::open::{OpenTask, OpenTransport, open_path};
use crate::page::{Page, RenderError, replace_children, select_in, set_attribute, set_text};
use crate::webapp::{Identity, WebAppProvider};
use kuchiki::NodeRef;
use std::sync::Arc;
use tracing::debug;

pub const APP_ELEMENT_ID: &str = "app";
pub const COUNTER_BUTTON_ID: &str = "counter";
pub const NO_USERNAME: &str = "no username";

const FULL_NAME_SLOT: &str = "[data-field=\"full-name\"]";
const HANDLE_SLOT: &str = "[data-field=\"handle\"]";

const GREETING_TEMPLATE: &str = r#"
  <div class="greeting">
    <h1>Hello, <span data-field="full-name"></span></h1>
    <p class="handle" data-field="handle"></p>
    <div class="card">
      <button id="counter" type="button"></button>
    </div>
  </div>
"#;

/// Per-page view model derived from the unsafe identity payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingView {
    /// Given name immediately followed by family name, no separator.
    pub full_name: String,
    /// `@username`, or [`NO_USERNAME`]. Never empty.
    pub handle: String,
}

impl GreetingView {
    pub fn from_identity(identity: &Identity) -> Self {
        let mut full_name = String::new();
        if let Some(given) = &identity.given_name {
            full_name.push_str(given);
        }
        if let Some(family) = &identity.family_name {
            full_name.push_str(family);
        }

        let handle = match identity.handle.as_deref() {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => NO_USERNAME.to_string(),
        };

        Self { full_name, handle }
    }

    /// Builds the greeting subtree under `container`, replacing its children.
    pub fn mount(&self, container: &NodeRef) -> Result<(), RenderError> {
        replace_children(container, GREETING_TEMPLATE)?;
        set_text(&select_in(container, FULL_NAME_SLOT)?, &self.full_name);
        set_text(&select_in(container, HANDLE_SLOT)?, &self.handle);
        Ok(())
    }
}

/// Collaborator that wires up the counter button.
pub trait CounterSetup: Send + Sync {
    fn setup(&self, button: &NodeRef);
}

/// Starts the counter at zero; clicks are handled by the browser script.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickCounter;

impl CounterSetup for ClickCounter {
    fn setup(&self, button: &NodeRef) {
        set_attribute(button, "data-count", "0");
        set_text(button, "count is 0");
    }
}

pub struct GreetingRenderer {
    provider: Arc<dyn WebAppProvider>,
    transport: Arc<dyn OpenTransport>,
    counter: Arc<dyn CounterSetup>,
}

impl GreetingRenderer {
    pub fn new(provider: Arc<dyn WebAppProvider>, transport: Arc<dyn OpenTransport>) -> Self {
        Self::with_counter(provider, transport, Arc::new(ClickCounter))
    }

    pub fn with_counter(
        provider: Arc<dyn WebAppProvider>,
        transport: Arc<dyn OpenTransport>,
        counter: Arc<dyn CounterSetup>,
    ) -> Self {
        Self {
            provider,
            transport,
            counter,
        }
    }

    /// Runs the page-load sequence against `page`.
    ///
    /// The open call is dispatched before the DOM is touched, so it is
    /// already in flight when a missing element makes this return an error.
    pub fn init(&self, page: &Page) -> Result<OpenTask, RenderError> {
        self.provider.ready();

        let open = OpenTask::spawn(
            self.transport.clone(),
            open_path(&self.provider.session_token()),
        );

        let view = GreetingView::from_identity(&self.provider.identity());
        let container = page.element_by_id(APP_ELEMENT_ID)?;
        view.mount(&container)?;
        debug!(handle = %view.handle, "greeting rendered");

        let button = page.element_by_id(COUNTER_BUTTON_ID)?;
        self.counter.setup(&button);
        Ok(open)
    }

    /// Parses `shell_html`, runs [`Self::init`] and serializes the result.
    pub fn render_html(&self, shell_html: &str) -> Result<(String, OpenTask), RenderError> {
        let page = Page::parse(shell_html);
        let open = self.init(&page)?;
        Ok((page.to_html(), open))
    }
}
