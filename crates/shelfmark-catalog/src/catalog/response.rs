//! Read-only views over parsed catalog responses.
//!
//! Every accessor is total: a missing element anywhere along a path yields
//! `None` (or an empty collection), never an error.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ApiFault, CatalogError, Result};

// ─── XmlNode ─────────────────────────────────────────────────────────────────

/// One element of a parsed document, keyed by local name (namespaces dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(Self::from_start(&e)?),
                Ok(Event::Empty(e)) => {
                    let node = Self::from_start(&e)?;
                    attach(&mut stack, &mut root, node);
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| CatalogError::Parse("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, node);
                }
                Ok(Event::Text(t)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| CatalogError::Parse(format!("bad text: {e}")))?;
                        top.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(CatalogError::Parse(format!(
                        "invalid xml at byte {}: {e}",
                        reader.error_position()
                    )));
                }
            }
        }

        if !stack.is_empty() {
            return Err(CatalogError::Parse("unclosed element".to_string()));
        }
        root.ok_or_else(|| CatalogError::Parse("empty document".to_string()))
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| CatalogError::Parse(format!("bad attribute: {err}")))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| CatalogError::Parse(format!("bad attribute value: {err}")))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Walk a dotted chain (`ItemAttributes.Publisher`), first match per segment.
    pub fn path(&self, path: &str) -> Option<&XmlNode> {
        path.split('.')
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Trimmed text content, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    pub fn path_text(&self, path: &str) -> Option<&str> {
        self.path(path).and_then(XmlNode::text)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

// ─── ItemsResponse ───────────────────────────────────────────────────────────

/// Envelope of an `ItemLookup`/`ItemSearch` response, or a service error
/// document.
#[derive(Debug, Clone)]
pub struct ItemsResponse {
    root: XmlNode,
}

impl ItemsResponse {
    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self {
            root: XmlNode::parse(xml)?,
        })
    }

    /// Fault from an `…ErrorResponse` document (`Error/Code`, `Error/Message`).
    pub fn error_document(&self) -> Option<ApiFault> {
        if !self.root.name.ends_with("ErrorResponse") {
            return None;
        }
        let error = self.root.child("Error")?;
        Some(ApiFault::new(
            error.path_text("Code").unwrap_or("Unknown"),
            error.path_text("Message").unwrap_or_default(),
        ))
    }

    /// `Items/Request/IsValid`; absent counts as valid.
    pub fn is_valid(&self) -> bool {
        !matches!(
            self.root.path_text("Items.Request.IsValid"),
            Some(v) if v.eq_ignore_ascii_case("false")
        )
    }

    pub fn first_error(&self) -> Option<ApiFault> {
        let error = self.root.path("Items.Request.Errors.Error")?;
        Some(ApiFault::new(
            error.path_text("Code").unwrap_or("Unknown"),
            error.path_text("Message").unwrap_or_default(),
        ))
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.root
            .path_text("Items.TotalPages")
            .and_then(|v| v.parse().ok())
    }

    pub fn into_items(self) -> Vec<ProductRecord> {
        let Some(items) = self.root.children.into_iter().find(|c| c.name == "Items") else {
            return Vec::new();
        };
        items
            .children
            .into_iter()
            .filter(|c| c.name == "Item")
            .map(ProductRecord::new)
            .collect()
    }
}

// ─── ProductRecord ───────────────────────────────────────────────────────────

/// A sibling edition listed under `AlternateVersions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternateVersion {
    pub vendor_id: Option<String>,
    pub title: Option<String>,
    pub binding: Option<String>,
}

/// One `Item` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    item: XmlNode,
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// `YYYY-MM-DD`, with `YYYY-MM` and `YYYY` taken as the first day.
fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d"))
        .ok()
}

impl ProductRecord {
    pub fn new(item: XmlNode) -> Self {
        Self { item }
    }

    pub fn node(&self) -> &XmlNode {
        &self.item
    }

    pub fn vendor_id(&self) -> Option<String> {
        owned(self.item.path_text("ASIN"))
    }

    pub fn parent_vendor_id(&self) -> Option<String> {
        owned(self.item.path_text("ParentASIN"))
    }

    pub fn detail_page_url(&self) -> Option<String> {
        owned(self.item.path_text("DetailPageURL"))
    }

    /// Text of any `ItemAttributes` child.
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.item
            .child("ItemAttributes")
            .and_then(|attrs| attrs.child(name))
            .and_then(XmlNode::text)
            .map(str::to_string)
    }

    pub fn title(&self) -> Option<String> {
        self.get_attribute("Title")
    }

    pub fn isbn(&self) -> Option<String> {
        self.get_attribute("ISBN")
    }

    pub fn eisbn(&self) -> Option<String> {
        self.get_attribute("EISBN")
    }

    /// `EAN`, else the first `EANList/EANListElement`.
    pub fn ean(&self) -> Option<String> {
        self.get_attribute("EAN").or_else(|| {
            owned(
                self.item
                    .path_text("ItemAttributes.EANList.EANListElement"),
            )
        })
    }

    /// ISBN, else EISBN, else EAN (with its list fallback).
    pub fn isbn_like(&self) -> Option<String> {
        self.isbn().or_else(|| self.eisbn()).or_else(|| self.ean())
    }

    /// `(name, role)` for each `Creator`, in document order.
    pub fn creators(&self) -> Vec<(String, Option<String>)> {
        let Some(attrs) = self.item.child("ItemAttributes") else {
            return Vec::new();
        };
        attrs
            .children_named("Creator")
            .filter_map(|c| Some((c.text()?.to_string(), owned(c.attr("Role")))))
            .collect()
    }

    /// Every `Author`; when there are none, the first creator's name.
    pub fn authors(&self) -> Vec<String> {
        let authors: Vec<String> = self
            .item
            .child("ItemAttributes")
            .map(|attrs| {
                attrs
                    .children_named("Author")
                    .filter_map(XmlNode::text)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if !authors.is_empty() {
            return authors;
        }
        self.creators()
            .into_iter()
            .next()
            .map(|(name, _)| vec![name])
            .unwrap_or_default()
    }

    pub fn publisher(&self) -> Option<String> {
        self.get_attribute("Publisher")
    }

    pub fn binding(&self) -> Option<String> {
        self.get_attribute("Binding")
    }

    pub fn edition(&self) -> Option<String> {
        self.get_attribute("Edition")
    }

    pub fn pages(&self) -> Option<u32> {
        self.get_attribute("NumberOfPages")
            .and_then(|p| p.parse().ok())
    }

    pub fn languages(&self) -> BTreeSet<String> {
        self.item
            .path("ItemAttributes.Languages")
            .map(|langs| {
                langs
                    .children
                    .iter()
                    .filter_map(|l| l.path_text("Name"))
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn publication_date(&self) -> Option<NaiveDate> {
        parse_date(self.item.path_text("ItemAttributes.PublicationDate"))
    }

    pub fn release_date(&self) -> Option<NaiveDate> {
        parse_date(self.item.path_text("ItemAttributes.ReleaseDate"))
    }

    pub fn editorial_reviews(&self) -> Vec<String> {
        self.item
            .child("EditorialReviews")
            .map(|reviews| {
                reviews
                    .children
                    .iter()
                    .filter_map(|r| r.path_text("Content"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn editorial_review(&self) -> Option<String> {
        self.editorial_reviews().into_iter().next()
    }

    /// `Name` of each `BrowseNodes` child.
    pub fn browse_node_names(&self) -> Vec<String> {
        self.item
            .child("BrowseNodes")
            .map(|nodes| {
                nodes
                    .children
                    .iter()
                    .filter_map(|n| n.path_text("Name"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn large_image_url(&self) -> Option<String> {
        owned(self.item.path_text("LargeImage.URL"))
    }

    pub fn medium_image_url(&self) -> Option<String> {
        owned(self.item.path_text("MediumImage.URL"))
    }

    pub fn small_image_url(&self) -> Option<String> {
        owned(self.item.path_text("SmallImage.URL"))
    }

    pub fn tiny_image_url(&self) -> Option<String> {
        owned(self.item.path_text("ImageSets.ImageSet.TinyImage.URL"))
    }

    pub fn alternate_versions(&self) -> Vec<AlternateVersion> {
        self.item
            .child("AlternateVersions")
            .map(|versions| {
                versions
                    .children_named("AlternateVersion")
                    .map(|v| AlternateVersion {
                        vendor_id: owned(v.path_text("ASIN")),
                        title: owned(v.path_text("Title")),
                        binding: owned(v.path_text("Binding")),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal `Item` element.
    pub fn item(asin: &str, title: &str, binding: &str, extra: &str) -> String {
        format!(
            "<Item><ASIN>{asin}</ASIN><ItemAttributes><Title>{title}</Title>\
             <Binding>{binding}</Binding></ItemAttributes>{extra}</Item>"
        )
    }

    pub fn lookup_response(items: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" ?><ItemLookupResponse xmlns="http://webservices.amazon.com/AWSECommerceService/2013-08-01"><Items><Request><IsValid>True</IsValid></Request>{}</Items></ItemLookupResponse>"#,
            items.concat()
        )
    }

    pub fn search_response(items: &[String], total_pages: u32) -> String {
        format!(
            r#"<?xml version="1.0" ?><ItemSearchResponse xmlns="http://webservices.amazon.com/AWSECommerceService/2013-08-01"><Items><Request><IsValid>True</IsValid></Request><TotalResults>{}</TotalResults><TotalPages>{total_pages}</TotalPages>{}</Items></ItemSearchResponse>"#,
            items.len(),
            items.concat()
        )
    }

    pub fn not_found_response(root: &str, code: &str) -> String {
        format!(
            r#"<?xml version="1.0" ?><{root} xmlns="http://webservices.amazon.com/AWSECommerceService/2013-08-01"><Items><Request><IsValid>True</IsValid><Errors><Error><Code>{code}</Code><Message>We did not find any matches for your request.</Message></Error></Errors></Request></Items></{root}>"#
        )
    }

    pub fn invalid_response(code: &str) -> String {
        format!(
            r#"<?xml version="1.0" ?><ItemLookupResponse><Items><Request><IsValid>False</IsValid><Errors><Error><Code>{code}</Code><Message>The value you specified is invalid.</Message></Error></Errors></Request></Items></ItemLookupResponse>"#
        )
    }
}
