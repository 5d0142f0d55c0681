//! Markup ⇄ block codec.
//!
//! Only top-level nodes become blocks. The scanner understands open, close
//! and self-closing tags, comments, and quoted attribute values; everything
//! else is text. Inline markup inside block bodies is carried through
//! byte-for-byte.

use std::ops::Range;

use super::model::{Block, ListStyle, RawBlock};

/// Elements that belong to a paragraph run when they appear at top level.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "del", "dfn", "em", "i", "img", "ins",
    "kbd", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
    "wbr",
];

/// Elements that never have a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&nbsp;", "\u{a0}"),
];

// ════════════════════════════════════════════════════════════════════
// Markup -> blocks
// ════════════════════════════════════════════════════════════════════

/// Parse markup into blocks. Never returns an empty list.
pub fn to_blocks(markup: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    // Bare text and inline elements between blocks accumulate here.
    let mut run = String::new();

    for node in nodes(markup) {
        match node {
            Node::Text(span) => run.push_str(&markup[span]),
            Node::Element { name, outer, .. } | Node::Void { name, outer } if is_inline(&name) => {
                run.push_str(&markup[outer]);
            }
            Node::Comment => {}
            Node::Void { .. } => flush_run(&mut run, &mut blocks),
            Node::Element { name, inner, .. } => {
                flush_run(&mut run, &mut blocks);
                blocks.push(element_to_block(&name, &markup[inner]));
            }
        }
    }
    flush_run(&mut run, &mut blocks);

    if blocks.is_empty() {
        blocks.push(Block::paragraph(""));
    }
    blocks
}

fn flush_run(run: &mut String, blocks: &mut Vec<Block>) {
    let trimmed = run.trim();
    if has_visible_text(trimmed) {
        blocks.push(Block::paragraph(trimmed));
    }
    run.clear();
}

fn has_visible_text(src: &str) -> bool {
    nodes(src).into_iter().any(|node| match node {
        Node::Text(span) => !src[span].trim().is_empty(),
        Node::Element { inner, .. } => has_visible_text(&src[inner]),
        Node::Void { .. } | Node::Comment => false,
    })
}

fn element_to_block(name: &str, inner: &str) -> Block {
    match name {
        "p" => Block::paragraph(inner),
        "h1" => Block::header(inner, 1),
        "h2" => Block::header(inner, 2),
        "h3" => Block::header(inner, 3),
        "ul" => Block::List {
            style: ListStyle::Unordered,
            items: list_items(inner),
        },
        "ol" => Block::List {
            style: ListStyle::Ordered,
            items: list_items(inner),
        },
        "blockquote" => quote_block(inner),
        "pre" => Block::code(code_body(inner)),
        // Anything else degrades to a paragraph over its inner content.
        _ => Block::paragraph(inner),
    }
}

fn list_items(src: &str) -> Vec<String> {
    nodes(src)
        .into_iter()
        .filter_map(|node| match node {
            Node::Element { name, inner, .. } if name == "li" => Some(src[inner].to_string()),
            _ => None,
        })
        .collect()
}

/// A trailing `<cite>` (only whitespace after it) is the caption. A `<cite>`
/// inside the text stays part of the text.
fn quote_block(src: &str) -> Block {
    let last = nodes(src)
        .into_iter()
        .rev()
        .find(|node| !matches!(node, Node::Text(span) if src[span.clone()].trim().is_empty()));

    match last {
        Some(Node::Element { name, inner, outer }) if name == "cite" => {
            Block::quote(&src[..outer.start], &src[inner])
        }
        _ => Block::quote(src, ""),
    }
}

/// Strips one `<code>` wrapper if it is the only child, then decodes entities.
fn code_body(src: &str) -> String {
    let significant: Vec<Node> = nodes(src)
        .into_iter()
        .filter(|node| !matches!(node, Node::Text(span) if src[span.clone()].trim().is_empty()))
        .collect();

    let body = match significant.as_slice() {
        [Node::Element { name, inner, .. }] if name == "code" => &src[inner.clone()],
        _ => src,
    };
    unescape(body)
}

// ════════════════════════════════════════════════════════════════════
// Blocks -> markup
// ════════════════════════════════════════════════════════════════════

pub fn to_markup(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        write_block(&mut out, block);
    }
    out
}

fn write_block(out: &mut String, block: &Block) {
    match block {
        Block::Paragraph { text } => wrap(out, "p", text),
        Block::Header { text, level } => {
            let level = (*level).clamp(Block::MIN_HEADER_LEVEL, Block::MAX_HEADER_LEVEL);
            wrap(out, &format!("h{level}"), text);
        }
        Block::List { style, items } => {
            let tag = match style {
                ListStyle::Ordered => "ol",
                ListStyle::Unordered => "ul",
            };
            open(out, tag);
            for item in items {
                wrap(out, "li", item);
            }
            close(out, tag);
        }
        Block::Quote { text, caption } => {
            open(out, "blockquote");
            out.push_str(text);
            if !caption.is_empty() {
                wrap(out, "cite", caption);
            }
            close(out, "blockquote");
        }
        Block::Code { text } => wrap(out, "pre", &escape(text)),
    }
}

fn wrap(out: &mut String, tag: &str, body: &str) {
    open(out, tag);
    out.push_str(body);
    close(out, tag);
}

fn open(out: &mut String, tag: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
}

fn close(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Emergency extraction: keep only blocks that carry a `text` payload and
/// emit each as a paragraph. Never fails.
pub fn recover_paragraphs(raw: &[RawBlock]) -> String {
    let mut out = String::new();
    for text in raw.iter().filter_map(RawBlock::text) {
        if !text.trim().is_empty() {
            wrap(&mut out, "p", text);
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

// Single pass, so `&amp;lt;` decodes to `&lt;` and not `<`.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, decoded)) => {
                out.push_str(decoded);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ════════════════════════════════════════════════════════════════════
// Scanner
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(Range<usize>),
    Element {
        name: String,
        inner: Range<usize>,
        outer: Range<usize>,
    },
    Void {
        name: String,
        outer: Range<usize>,
    },
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
    Comment,
}

#[derive(Debug)]
struct Tag {
    kind: TagKind,
    name: String,
    end: usize,
}

fn is_inline(name: &str) -> bool {
    INLINE_TAGS.contains(&name)
}

fn is_void(name: &str) -> bool {
    VOID_TAGS.contains(&name)
}

/// Split `src` into sibling nodes. Stray closing tags are dropped; an
/// unclosed element runs to the end of input.
fn nodes(src: &str) -> Vec<Node> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while let Some(offset) = src[pos..].find('<') {
        let at = pos + offset;
        let Some(tag) = read_tag(src, at) else {
            // Literal `<` in text.
            pos = at + 1;
            continue;
        };

        if text_start < at {
            out.push(Node::Text(text_start..at));
        }

        pos = match tag.kind {
            TagKind::Comment => {
                out.push(Node::Comment);
                tag.end
            }
            TagKind::Close => tag.end,
            TagKind::SelfClosing => {
                out.push(Node::Void {
                    name: tag.name,
                    outer: at..tag.end,
                });
                tag.end
            }
            TagKind::Open if is_void(&tag.name) => {
                out.push(Node::Void {
                    name: tag.name,
                    outer: at..tag.end,
                });
                tag.end
            }
            TagKind::Open => {
                let (inner_end, after) = find_close(src, &tag.name, tag.end);
                out.push(Node::Element {
                    name: tag.name,
                    inner: tag.end..inner_end,
                    outer: at..after,
                });
                after
            }
        };
        text_start = pos;
    }

    if text_start < src.len() {
        out.push(Node::Text(text_start..src.len()));
    }
    out
}

/// Returns (start of the matching close tag, end of it), honoring nesting of
/// same-named elements.
fn find_close(src: &str, name: &str, from: usize) -> (usize, usize) {
    let mut depth = 1usize;
    let mut pos = from;

    while let Some(offset) = src[pos..].find('<') {
        let at = pos + offset;
        let Some(tag) = read_tag(src, at) else {
            pos = at + 1;
            continue;
        };
        pos = tag.end;

        if tag.name != name {
            continue;
        }
        match tag.kind {
            TagKind::Open => depth += 1,
            TagKind::Close => {
                depth -= 1;
                if depth == 0 {
                    return (at, tag.end);
                }
            }
            TagKind::SelfClosing | TagKind::Comment => {}
        }
    }
    (src.len(), src.len())
}

/// Read the tag whose `<` sits at `at`. `None` means the `<` is plain text.
fn read_tag(src: &str, at: usize) -> Option<Tag> {
    let bytes = src.as_bytes();
    let rest = &src[at..];

    if let Some(body) = rest.strip_prefix("<!--") {
        let end = body.find("-->").map_or(src.len(), |i| at + 4 + i + 3);
        return Some(Tag {
            kind: TagKind::Comment,
            name: String::new(),
            end,
        });
    }

    let mut i = at + 1;
    let kind = match bytes.get(i) {
        Some(b'/') => {
            i += 1;
            TagKind::Close
        }
        // <!DOCTYPE ..> and <?xml ..?>
        Some(b'!') | Some(b'?') => {
            let end = at + rest.find('>')? + 1;
            return Some(Tag {
                kind: TagKind::Comment,
                name: String::new(),
                end,
            });
        }
        _ => TagKind::Open,
    };

    let name_start = i;
    if !bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    while bytes
        .get(i)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'-')
    {
        i += 1;
    }
    let name = src[name_start..i].to_ascii_lowercase();

    let mut quote: Option<u8> = None;
    while let Some(&b) = bytes.get(i) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => {
                let kind = if kind == TagKind::Open && bytes[i - 1] == b'/' {
                    TagKind::SelfClosing
                } else {
                    kind
                };
                return Some(Tag {
                    kind,
                    name,
                    end: i + 1,
                });
            }
            None => {}
        }
        i += 1;
    }
    None
}
