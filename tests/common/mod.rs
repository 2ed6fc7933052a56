#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use scraper::Html;

use fbref_collect::page_fetch::PageSource;
use fbref_collect::runner::Sources;

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

pub fn fixture_doc(name: &str) -> Html {
    Html::parse_document(&read_fixture(name))
}

/// Serves canned pages by URL and remembers every URL it was asked for.
#[derive(Clone, Default)]
pub struct StubSource {
    pages: HashMap<String, String>,
    pub requested: Rc<RefCell<Vec<String>>>,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, fixture: &str) -> Self {
        self.pages.insert(url.into(), read_fixture(fixture));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl PageSource for StubSource {
    fn fetch_page(&mut self, url: &str) -> Option<Html> {
        self.requested.borrow_mut().push(url.to_string());
        self.pages.get(url).map(|html| Html::parse_document(html))
    }
}

/// Hands out clones of one stub for both the basic and enhanced fetchers.
pub struct StubSources(pub StubSource);

impl Sources for StubSources {
    fn basic(&self) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(self.0.clone()))
    }

    fn enhanced(&self) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(self.0.clone()))
    }
}
