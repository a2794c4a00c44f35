use std::sync::{Arc, Mutex};

use url::Url;

use crate::fragment::{self, Fragment};
use crate::navigation::NavigationTarget;

/// The page location as seen by one book. Implemented by the host.
pub trait AddressBar: Send {
    fn current(&self) -> Url;

    /// Replaces the fragment, creating a new history entry.
    fn set_fragment(&mut self, fragment: &str);
}

/// History-keeping address bar used by the CLI, the host binary and tests.
#[derive(Debug, Clone)]
pub struct MemoryAddressBar {
    history: Vec<Url>,
    cursor: usize,
}

impl MemoryAddressBar {
    pub fn new(url: Url) -> Self {
        Self {
            history: vec![url],
            cursor: 0,
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let url = Url::parse(raw).map_err(|err| anyhow::anyhow!("parse page url {raw:?}: {err}"))?;
        Ok(Self::new(url))
    }

    /// Steps back in history and returns the new location, like the browser back button.
    pub fn back(&mut self) -> Option<Url> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.history[self.cursor].clone())
    }

    pub fn forward(&mut self) -> Option<Url> {
        if self.cursor + 1 >= self.history.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.history[self.cursor].clone())
    }

    /// Navigates to an arbitrary location, e.g. a hand-edited URL.
    pub fn visit(&mut self, url: Url) {
        self.history.truncate(self.cursor + 1);
        self.history.push(url);
        self.cursor = self.history.len() - 1;
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl AddressBar for MemoryAddressBar {
    fn current(&self) -> Url {
        self.history[self.cursor].clone()
    }

    fn set_fragment(&mut self, fragment: &str) {
        let mut url = self.current();
        let body = fragment.strip_prefix('#').unwrap_or(fragment);
        url.set_fragment(if body.is_empty() { None } else { Some(body) });
        self.visit(url);
    }
}

/// One page address bar shared by every book embedded on the page.
#[derive(Debug, Clone)]
pub struct SharedAddressBar {
    inner: Arc<Mutex<MemoryAddressBar>>,
}

impl SharedAddressBar {
    pub fn new(bar: MemoryAddressBar) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bar)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryAddressBar) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl AddressBar for SharedAddressBar {
    fn current(&self) -> Url {
        self.with(|bar| bar.current())
    }

    fn set_fragment(&mut self, fragment: &str) {
        self.with(|bar| bar.set_fragment(fragment));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationChange {
    /// The change was caused by this book's own write.
    OwnEcho,
    /// A fragment for this book that the book did not write.
    External(Fragment),
    /// The fragment was removed altogether, e.g. history went back past the book.
    Cleared,
    /// Garbled or belonging to another book.
    Foreign,
}

/// Two-way bridge between the navigation state and the page's address bar.
/// The last fragment this book wrote is remembered until the host reports it
/// back, so the book can tell its own changes from back/forward.
pub struct LocationSync {
    book_id: u64,
    address_bar: Box<dyn AddressBar>,
    awaiting_echo: Option<String>,
}

impl std::fmt::Debug for LocationSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSync")
            .field("book_id", &self.book_id)
            .field("location", &self.address_bar.current().as_str())
            .field("awaiting_echo", &self.awaiting_echo)
            .finish()
    }
}

impl LocationSync {
    pub fn new(book_id: u64, address_bar: Box<dyn AddressBar>) -> Self {
        Self {
            book_id,
            address_bar,
            awaiting_echo: None,
        }
    }

    pub fn current_url(&self) -> Url {
        self.address_bar.current()
    }

    /// The current fragment if it belongs to this book, otherwise empty.
    pub fn observed(&self) -> Fragment {
        let fragment = Fragment::from_url(&self.address_bar.current());
        if fragment::validate(&fragment, self.book_id) {
            fragment
        } else {
            Fragment::new()
        }
    }

    /// Writes the target into the address bar. Targets for other books are ignored.
    pub fn push(&mut self, target: &NavigationTarget) -> Option<String> {
        if target.book_id != self.book_id {
            tracing::debug!(
                book_id = self.book_id,
                target_book_id = target.book_id,
                "ignore navigation for another book"
            );
            return None;
        }

        let encoded = fragment::encode(&target.to_fragment());
        self.address_bar.set_fragment(&encoded);
        let written = self.address_bar.current().fragment().map(str::to_owned);
        self.awaiting_echo = written.clone();
        Some(format!("#{}", written.unwrap_or_default()))
    }

    /// Classifies a location change reported by the host.
    pub fn on_location_changed(&mut self, url: &Url) -> LocationChange {
        let raw = url.fragment();
        if let Some(expected) = &self.awaiting_echo
            && raw == Some(expected.as_str())
        {
            self.awaiting_echo = None;
            return LocationChange::OwnEcho;
        }
        self.awaiting_echo = None;

        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return LocationChange::Cleared;
        };
        let fragment = Fragment::from_url(url);
        if fragment::validate(&fragment, self.book_id) {
            LocationChange::External(fragment)
        } else {
            tracing::debug!(book_id = self.book_id, fragment = raw, "ignore foreign fragment");
            LocationChange::Foreign
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(url: &str) -> LocationSync {
        LocationSync::new(4, Box::new(MemoryAddressBar::parse(url).unwrap()))
    }

    fn target(book_id: u64, chapter: &str) -> NavigationTarget {
        NavigationTarget::new(book_id, chapter)
    }

    #[test]
    fn push_writes_own_book_only() {
        let mut sync = sync("https://lms.test/course");
        assert!(sync.push(&target(5, "c1")).is_none());
        assert!(sync.observed().is_empty());

        let written = sync.push(&target(4, "c1")).unwrap();
        assert_eq!(written, "#h5pbookid=4&chapter=c1");
        assert_eq!(sync.observed().chapter(), Some("c1"));
    }

    #[test]
    fn observed_values_are_percent_decoded() {
        let mut sync = sync("https://lms.test/course");
        let written = sync.push(&target(4, "my chapter")).unwrap();
        assert_eq!(written, "#h5pbookid=4&chapter=my%20chapter");
        assert_eq!(sync.observed().chapter(), Some("my chapter"));

        let url = Url::parse("https://lms.test/course#h5pbookid=4&chapter=caf%C3%A9").unwrap();
        let LocationChange::External(fragment) = sync.on_location_changed(&url) else {
            panic!("expected an external change");
        };
        assert_eq!(fragment.chapter(), Some("café"));
    }

    #[test]
    fn own_write_is_recognised_as_echo_once() {
        let mut sync = sync("https://lms.test/course");
        sync.push(&target(4, "c2"));
        let url = sync.current_url();
        assert_eq!(sync.on_location_changed(&url), LocationChange::OwnEcho);
        assert!(matches!(
            sync.on_location_changed(&url),
            LocationChange::External(_)
        ));
    }

    #[test]
    fn foreign_and_cleared_fragments_are_classified() {
        let mut sync = sync("https://lms.test/course");
        let other = Url::parse("https://lms.test/course#h5pbookid=9&chapter=x").unwrap();
        assert_eq!(sync.on_location_changed(&other), LocationChange::Foreign);
        let garbage = Url::parse("https://lms.test/course#chapter&&=").unwrap();
        assert_eq!(sync.on_location_changed(&garbage), LocationChange::Foreign);
        let bare = Url::parse("https://lms.test/course").unwrap();
        assert_eq!(sync.on_location_changed(&bare), LocationChange::Cleared);
    }

    #[test]
    fn memory_address_bar_keeps_history() {
        let mut bar = MemoryAddressBar::parse("https://lms.test/a").unwrap();
        bar.set_fragment("#x=1");
        bar.set_fragment("#x=2");
        assert_eq!(bar.back().unwrap().fragment(), Some("x=1"));
        assert_eq!(bar.back().unwrap().fragment(), None);
        assert!(bar.back().is_none());
        assert_eq!(bar.forward().unwrap().fragment(), Some("x=1"));
        bar.set_fragment("#x=3");
        assert!(bar.forward().is_none());
        assert_eq!(bar.history_len(), 3);
    }

    #[test]
    fn shared_address_bar_is_seen_by_every_holder() {
        let page = SharedAddressBar::new(MemoryAddressBar::parse("https://lms.test/a").unwrap());
        let mut first = LocationSync::new(1, Box::new(page.clone()));
        let second = LocationSync::new(2, Box::new(page.clone()));
        first.push(&target(1, "c1"));
        assert_eq!(first.observed().chapter(), Some("c1"));
        assert!(second.observed().is_empty());
        assert_eq!(page.with(|bar| bar.history_len()), 2);
    }
}
