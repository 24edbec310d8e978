//! Endpoint classification for inbound GraphQL operations.
//!
//! Explicit tags always win. Untagged operations are classified by their
//! root fields: the document is tokenized (strings and comments skipped),
//! the selection sets of every operation are walked one level deep, and
//! fragment spreads at the root are resolved against the document's own
//! fragment definitions. Nested fields never influence routing, so a product
//! `metafield` or a `customer` argument name cannot pull a catalog query over
//! to the identity endpoint.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Upstream a GraphQL operation is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Storefront API: products, collections, carts.
    #[serde(alias = "storefront")]
    Catalog,
    /// Customer Account API: login codes, profile, metafields.
    #[serde(alias = "customer")]
    Identity,
}

impl EndpointKind {
    /// Name for logs and response metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Identity => "identity",
        }
    }
}

/// Root fields served only by the identity endpoint.
const IDENTITY_ROOT_FIELDS: &[&str] = &[
    "customer",
    "customerUpdate",
    "metafieldsSet",
    "metafieldsDelete",
];

/// Root field prefixes served only by the identity endpoint.
const IDENTITY_ROOT_PREFIXES: &[&str] = &["customerAddress", "customerEmailMarketing"];

/// Lowercase fragments marking login-code and verification operations.
const IDENTITY_MARKERS: &[&str] = &["logincode", "verif"];

/// Pick the upstream for an operation.
#[must_use]
pub fn classify(query: &str, explicit: Option<EndpointKind>) -> EndpointKind {
    if let Some(kind) = explicit {
        return kind;
    }

    if root_fields(query).iter().any(|f| is_identity_field(f)) {
        EndpointKind::Identity
    } else {
        EndpointKind::Catalog
    }
}

/// Whether a root field belongs to the identity endpoint.
#[must_use]
pub fn is_identity_field(name: &str) -> bool {
    if IDENTITY_ROOT_FIELDS.contains(&name) {
        return true;
    }
    if IDENTITY_ROOT_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    IDENTITY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Root field names selected by every operation in the document, aliases
/// resolved to the underlying field.
#[must_use]
pub fn root_fields(query: &str) -> Vec<String> {
    let document = Parser::new(tokenize(query)).document();

    let mut fields = Vec::new();
    for selections in &document.operations {
        let mut visited = HashSet::new();
        expand(selections, &document.fragments, &mut visited, &mut fields);
    }
    fields
}

fn expand<'a>(
    selections: &[Selection<'a>],
    fragments: &HashMap<&'a str, Vec<Selection<'a>>>,
    visited: &mut HashSet<&'a str>,
    out: &mut Vec<String>,
) {
    for selection in selections {
        match selection {
            Selection::Field(name) => {
                if !out.iter().any(|f| f.as_str() == *name) {
                    out.push((*name).to_string());
                }
            }
            Selection::Spread(name) => {
                if visited.insert(*name)
                    && let Some(inner) = fragments.get(name)
                {
                    expand(inner, fragments, visited, out);
                }
            }
        }
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a str),
    Punct(char),
    Spread,
    /// Strings and numbers; only their position matters.
    Value,
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&b) = bytes.get(i) {
        match b {
            b'#' => {
                while bytes.get(i).is_some_and(|&c| c != b'\n') {
                    i += 1;
                }
            }
            b'"' => {
                i = skip_string(bytes, i);
                tokens.push(Token::Value);
            }
            b'.' if starts_with_at(bytes, i, b"...") => {
                tokens.push(Token::Spread);
                i += 3;
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let start = i;
                while bytes
                    .get(i)
                    .is_some_and(|&c| c == b'_' || c.is_ascii_alphanumeric())
                {
                    i += 1;
                }
                if let Some(name) = source.get(start..i) {
                    tokens.push(Token::Name(name));
                }
            }
            b'-' | b'0'..=b'9' => {
                i += 1;
                while bytes
                    .get(i)
                    .is_some_and(|&c| c.is_ascii_alphanumeric() || matches!(c, b'.' | b'+' | b'-'))
                {
                    i += 1;
                }
                tokens.push(Token::Value);
            }
            b'{' | b'}' | b'(' | b')' | b'[' | b']' | b':' | b'@' | b'$' | b'=' | b'!' | b'|'
            | b'&' => {
                tokens.push(Token::Punct(char::from(b)));
                i += 1;
            }
            _ => i += 1,
        }
    }

    tokens
}

fn starts_with_at(bytes: &[u8], at: usize, pattern: &[u8]) -> bool {
    bytes.get(at..).is_some_and(|rest| rest.starts_with(pattern))
}

/// Index just past the string starting at `start` (plain or block string).
fn skip_string(bytes: &[u8], start: usize) -> usize {
    if starts_with_at(bytes, start, b"\"\"\"") {
        let mut i = start + 3;
        while i < bytes.len() {
            if starts_with_at(bytes, i, b"\\\"\"\"") {
                i += 4;
            } else if starts_with_at(bytes, i, b"\"\"\"") {
                return i + 3;
            } else {
                i += 1;
            }
        }
        return bytes.len();
    }

    let mut i = start + 1;
    while let Some(&c) = bytes.get(i) {
        match c {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection<'a> {
    Field(&'a str),
    Spread(&'a str),
}

#[derive(Debug, Default)]
struct Document<'a> {
    operations: Vec<Vec<Selection<'a>>>,
    fragments: HashMap<&'a str, Vec<Selection<'a>>>,
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn document(mut self) -> Document<'a> {
        let mut document = Document::default();

        while let Some(token) = self.peek() {
            match token {
                Token::Name("fragment") => {
                    self.bump();
                    let name = match self.bump() {
                        Some(Token::Name(name)) => name,
                        _ => continue,
                    };
                    self.skip_until_open_brace();
                    let selections = self.selection_set();
                    document.fragments.insert(name, selections);
                }
                Token::Name("query" | "mutation" | "subscription") => {
                    self.bump();
                    self.skip_until_open_brace();
                    let selections = self.selection_set();
                    document.operations.push(selections);
                }
                Token::Punct('{') => {
                    let selections = self.selection_set();
                    document.operations.push(selections);
                }
                _ => {
                    self.bump();
                }
            }
        }

        document
    }

    /// Advance to the next `{` outside parentheses.
    fn skip_until_open_brace(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::Punct('{') => return,
                Token::Punct('(') => self.skip_balanced('(', ')'),
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Skip a balanced group starting at the current `open` token.
    fn skip_balanced(&mut self, open: char, close: char) {
        let mut depth = 0_usize;
        while let Some(token) = self.bump() {
            match token {
                Token::Punct(c) if c == open => depth += 1,
                Token::Punct(c) if c == close => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_directives(&mut self) {
        while self.peek() == Some(Token::Punct('@')) {
            self.bump();
            self.bump();
            if self.peek() == Some(Token::Punct('(')) {
                self.skip_balanced('(', ')');
            }
        }
    }

    /// Parse the selection set at the current `{`, returning its direct
    /// selections with inline fragments flattened.
    fn selection_set(&mut self) -> Vec<Selection<'a>> {
        let mut selections = Vec::new();
        if self.bump() != Some(Token::Punct('{')) {
            return selections;
        }

        while let Some(token) = self.peek() {
            match token {
                Token::Punct('}') => {
                    self.bump();
                    break;
                }
                Token::Spread => {
                    self.bump();
                    match self.peek() {
                        Some(Token::Name("on")) => {
                            self.bump();
                            self.bump();
                            self.skip_directives();
                            selections.extend(self.selection_set());
                        }
                        Some(Token::Punct('{' | '@')) => {
                            self.skip_directives();
                            selections.extend(self.selection_set());
                        }
                        Some(Token::Name(name)) => {
                            self.bump();
                            self.skip_directives();
                            selections.push(Selection::Spread(name));
                        }
                        _ => {}
                    }
                }
                Token::Name(first) => {
                    self.bump();
                    let name = if self.peek() == Some(Token::Punct(':')) {
                        match self.peek_at(1) {
                            Some(Token::Name(field)) => {
                                self.pos += 2;
                                field
                            }
                            _ => first,
                        }
                    } else {
                        first
                    };
                    if self.peek() == Some(Token::Punct('(')) {
                        self.skip_balanced('(', ')');
                    }
                    self.skip_directives();
                    if self.peek() == Some(Token::Punct('{')) {
                        self.skip_balanced('{', '}');
                    }
                    selections.push(Selection::Field(name));
                }
                Token::Punct('{') => self.skip_balanced('{', '}'),
                Token::Punct('(') => self.skip_balanced('(', ')'),
                _ => {
                    self.bump();
                }
            }
        }

        selections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_tag_wins() {
        let query = "mutation { customerUpdate(input: {}) { customer { id } } }";
        assert_eq!(
            classify(query, Some(EndpointKind::Catalog)),
            EndpointKind::Catalog
        );
        assert_eq!(
            classify("{ products(first: 1) { nodes { id } } }", Some(EndpointKind::Identity)),
            EndpointKind::Identity
        );
    }

    #[test]
    fn test_login_code_mutation_is_identity() {
        let query = r"
            mutation SendCode($email: String!) {
                customerSendLoginCode(email: $email) { userErrors { message } }
            }
        ";
        assert_eq!(classify(query, None), EndpointKind::Identity);

        let verify = "mutation V { verifyLoginCode(code: \"123456\") { ok } }";
        assert_eq!(classify(verify, None), EndpointKind::Identity);
    }

    #[test]
    fn test_customer_root_and_metafields_are_identity() {
        assert_eq!(
            classify("query { customer { id emailAddress { emailAddress } } }", None),
            EndpointKind::Identity
        );
        assert_eq!(
            classify(
                "mutation M($m: [MetafieldsSetInput!]!) { metafieldsSet(metafields: $m) { userErrors { message } } }",
                None
            ),
            EndpointKind::Identity
        );
        assert_eq!(
            classify("mutation { customerAddressCreate(address: {}) { customerAddress { id } } }", None),
            EndpointKind::Identity
        );
    }

    #[test]
    fn test_catalog_queries() {
        let query = r#"
            query Product($handle: String!) {
                product(handle: $handle) {
                    title
                    metafield(namespace: "custom", key: "customer_notes") { value }
                }
            }
        "#;
        assert_eq!(classify(query, None), EndpointKind::Catalog);
        assert_eq!(
            classify("{ cart(id: \"gid://shopify/Cart/1\") { id } }", None),
            EndpointKind::Catalog
        );
    }

    #[test]
    fn test_strings_and_comments_do_not_count() {
        let query = r#"
            # customer { id }
            query { products(query: "customer verifyLoginCode") { nodes { id } } }
        "#;
        assert_eq!(classify(query, None), EndpointKind::Catalog);

        let block = "query { search(query: \"\"\"metafieldsSet \\\"\"\" customer\"\"\") { id } }";
        assert_eq!(root_fields(block), vec!["search".to_string()]);
    }

    #[test]
    fn test_aliases_resolve_to_field() {
        assert_eq!(
            classify("query { me: customer { id } }", None),
            EndpointKind::Identity
        );
        assert_eq!(
            classify("query { customer: product(handle: \"x\") { id } }", None),
            EndpointKind::Catalog
        );
    }

    #[test]
    fn test_fragments_at_root_are_resolved() {
        let query = r"
            query { ...Me }
            fragment Me on QueryRoot { customer { id } }
        ";
        assert_eq!(classify(query, None), EndpointKind::Identity);

        let nested = r"
            query { products(first: 1) { nodes { ...P } } }
            fragment P on Product { id title }
        ";
        assert_eq!(classify(nested, None), EndpointKind::Catalog);
    }

    #[test]
    fn test_inline_fragment_and_directives() {
        let query = "query($skip: Boolean!) { ... on QueryRoot { shop @skip(if: $skip) { name } } }";
        assert_eq!(root_fields(query), vec!["shop".to_string()]);
    }

    #[test]
    fn test_recursive_fragments_terminate() {
        let query = "query { ...A } fragment A on Q { ...B } fragment B on Q { ...A shop { name } }";
        assert_eq!(root_fields(query), vec!["shop".to_string()]);
    }

    #[test]
    fn test_garbage_defaults_to_catalog() {
        assert_eq!(classify("", None), EndpointKind::Catalog);
        assert_eq!(classify("}}}{{{ ((( customer", None), EndpointKind::Catalog);
    }

    #[test]
    fn test_endpoint_kind_deserializes_aliases() {
        let kind: EndpointKind = serde_json::from_str("\"customer\"").unwrap_or(EndpointKind::Catalog);
        assert_eq!(kind, EndpointKind::Identity);
        let kind: EndpointKind = serde_json::from_str("\"storefront\"").unwrap_or(EndpointKind::Identity);
        assert_eq!(kind, EndpointKind::Catalog);
    }
}
