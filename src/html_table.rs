use scraper::{ElementRef, Html};

use crate::record::Record;

pub fn find_by_id<'a>(doc: &'a Html, tag: &str, id: &str) -> Option<ElementRef<'a>> {
    find_first(doc.root_element(), tag, |el| el.value().attr("id") == Some(id))
}

pub fn find_first<'a>(
    scope: ElementRef<'a>,
    tag: &str,
    pred: impl Fn(&ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    descendants(scope).find(|el| el.value().name() == tag && pred(el))
}

pub fn find_all<'a>(scope: ElementRef<'a>, tag: &str) -> Vec<ElementRef<'a>> {
    descendants(scope)
        .filter(|el| el.value().name() == tag)
        .collect()
}

pub fn find_all_of<'a>(scope: ElementRef<'a>, tags: &[&str]) -> Vec<ElementRef<'a>> {
    descendants(scope)
        .filter(|el| tags.contains(&el.value().name()))
        .collect()
}

pub fn child_elements<'a>(scope: ElementRef<'a>, tag: &str) -> Vec<ElementRef<'a>> {
    scope
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == tag)
        .collect()
}

// Strict descendants; the scope element itself is never returned.
fn descendants<'a>(scope: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    scope.descendants().skip(1).filter_map(ElementRef::wrap)
}

/// All text under the element, trimmed.
pub fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Each text node trimmed and the non-empty pieces joined without a separator.
pub fn stripped_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<String>()
}

pub fn attr<'a>(el: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name)
}

pub fn data_stat<'a>(el: &ElementRef<'a>) -> Option<&'a str> {
    attr(el, "data-stat")
}

pub fn first_link<'a>(el: ElementRef<'a>) -> Option<ElementRef<'a>> {
    find_first(el, "a", |_| true)
}

/// Body rows when the table has a `<tbody>`, otherwise every row holding a `<td>`.
pub fn data_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    if let Some(tbody) = find_first(table, "tbody", |_| true) {
        return find_all(tbody, "tr");
    }
    find_all(table, "tr")
        .into_iter()
        .filter(|row| find_first(*row, "td", |_| true).is_some())
        .collect()
}

/// Every `td`/`th` carrying a `data-stat` becomes a column holding its trimmed text, when
/// non-empty. With `links`, a cell's first link target is kept as `<stat>_href`.
pub fn row_record(row: ElementRef<'_>, skip: &[&str], links: bool) -> Record {
    let mut record = Record::new();
    for cell in find_all_of(row, &["td", "th"]) {
        let Some(stat) = data_stat(&cell) else {
            continue;
        };
        if skip.contains(&stat) {
            continue;
        }
        let text = text_of(&cell);
        if !text.is_empty() {
            record.insert(stat, text);
        }
        if links {
            if let Some(href) = first_link(cell).and_then(|a| attr(&a, "href")) {
                record.insert(format!("{stat}_href"), href);
            }
        }
    }
    record
}
