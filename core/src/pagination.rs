//! Lazy page-by-page iteration over list endpoints.
//!
//! # Design
//! `Pages` holds one request template and a cursor. Nothing is fetched until
//! the first call to `next`, and the following page is only requested once
//! every buffered entity of the current page has been handed out, so at most
//! one page is ever held in memory. A page shorter than `per_page`, or an
//! empty `X-Next-Page` header, ends the sequence. A failed fetch is yielded
//! in place and fuses the iterator; items already returned stay valid.

use std::collections::VecDeque;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::http::{HttpRequest, Transport};

pub const NEXT_PAGE_HEADER: &str = "x-next-page";

/// Lazy sequence of entities spread over numbered pages.
///
/// Each call to a list operation returns a fresh cursor starting at page 1.
/// A cursor has a single consumer; ask the client again for an independent
/// one.
pub struct Pages<'c, E> {
    transport: &'c dyn Transport,
    request: HttpRequest,
    per_page: u32,
    next_page: Option<u32>,
    buffer: VecDeque<E>,
    pages_fetched: u32,
}

impl<'c, E: DeserializeOwned> Pages<'c, E> {
    pub(crate) fn new(transport: &'c dyn Transport, request: HttpRequest, per_page: u32) -> Self {
        Self {
            transport,
            request,
            per_page: per_page.max(1),
            next_page: Some(1),
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// Number of transport calls made so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// The request a page fetch would send, before `page`/`per_page` are added.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    fn page_request(&self, page: u32) -> HttpRequest {
        let mut request = self.request.clone();
        request.query.push(("page".to_string(), page.to_string()));
        request
            .query
            .push(("per_page".to_string(), self.per_page.to_string()));
        request
    }

    fn fetch(&mut self, page: u32) -> Result<(), ApiError> {
        let request = self.page_request(page);
        tracing::debug!(path = %request.path, page, per_page = self.per_page, "fetching page");
        self.pages_fetched += 1;

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            tracing::warn!(path = %request.path, page, status = response.status, "page fetch failed");
            return Err(ApiError::from_response(&response));
        }

        let items: Vec<E> = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Deserialization(e.to_string()))?;

        let explicit_end = response
            .header(NEXT_PAGE_HEADER)
            .is_some_and(|next| next.trim().is_empty());
        let short_page = items.len() < self.per_page as usize;
        self.next_page = if short_page || explicit_end {
            None
        } else {
            page.checked_add(1)
        };

        tracing::debug!(page, count = items.len(), last = self.next_page.is_none(), "page received");
        self.buffer.extend(items);
        Ok(())
    }
}

impl<E: DeserializeOwned> Iterator for Pages<'_, E> {
    type Item = Result<E, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            let page = self.next_page?;
            if let Err(err) = self.fetch(page) {
                self.next_page = None;
                return Some(Err(err));
            }
        }
    }
}

impl<E> std::iter::FusedIterator for Pages<'_, E> where E: DeserializeOwned {}

impl<E> fmt::Debug for Pages<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pages")
            .field("path", &self.request.path)
            .field("per_page", &self.per_page)
            .field("next_page", &self.next_page)
            .field("buffered", &self.buffer.len())
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}
