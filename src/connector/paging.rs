use crate::connector::client::{attach, ClientInner};
use crate::connector::urls::join_url;
use crate::connector::values::resolve_reference;
use crate::connector::{InstanceProxy, Result};
use crate::model::PageDocument;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone)]
struct LoadedPage {
    items: Vec<Arc<InstanceProxy>>,
    next: Option<String>,
}

/// Lazy sequence over `{page, next_page}` documents. Pages are fetched on
/// demand and kept, so every cursor of the same sequence (and every clone of
/// it) shares what earlier cursors loaded.
#[derive(Debug, Clone)]
pub struct PagedSequence {
    url: String,
    client: Weak<ClientInner>,
    pages: Arc<Mutex<Vec<LoadedPage>>>,
}

impl PagedSequence {
    pub(crate) fn new(url: String, client: Weak<ClientInner>) -> Self {
        Self {
            url,
            client,
            pages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URL of the first page
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start a new pass from the first page
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            sequence: self.clone(),
            position: 0,
            next_url: Some(self.url.clone()),
        }
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages.lock().len()
    }

    /// Every item of every page, in server order
    pub async fn collect(&self) -> Result<Vec<Arc<InstanceProxy>>> {
        let mut cursor = self.cursor();
        let mut items = Vec::new();
        while let Some(page) = cursor.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    async fn load(&self, position: usize, url: &str) -> Result<LoadedPage> {
        if let Some(page) = self.pages.lock().get(position) {
            return Ok(page.clone());
        }

        let client = attach(&self.client)?;
        log::debug!("loading page {} of {} from {}", position + 1, self.url, url);
        let document: PageDocument = client.get_json(url).await?;

        let mut items = Vec::with_capacity(document.page.len());
        for reference in &document.page {
            items.push(resolve_reference(&client, url, reference)?);
        }
        let next = match document.next_page {
            Some(next) => Some(join_url(url, &next)?),
            None => None,
        };
        let page = LoadedPage { items, next };

        // A concurrent cursor may have stored this page first
        let mut pages = self.pages.lock();
        if pages.len() == position {
            pages.push(page.clone());
        }
        Ok(page)
    }
}

/// One pass over a [`PagedSequence`]
#[derive(Debug, Clone)]
pub struct PageCursor {
    sequence: PagedSequence,
    position: usize,
    next_url: Option<String>,
}

impl PageCursor {
    /// The next page, or `None` once the server stopped sending `next_page`
    pub async fn next_page(&mut self) -> Result<Option<Vec<Arc<InstanceProxy>>>> {
        let Some(url) = self.next_url.clone() else {
            return Ok(None);
        };
        let page = self.sequence.load(self.position, &url).await?;
        self.position += 1;
        self.next_url = page.next;
        Ok(Some(page.items))
    }

    /// Pages consumed by this cursor so far
    pub fn position(&self) -> usize {
        self.position
    }
}
