use std::sync::Arc;

use super::*;

fn render(source: &str, config: RenderConfig) -> RenderedMarkdown {
    let tree = Tokenizer::new().parse(source, None, true).expect("parses");
    Renderer::new().render(&tree, &Arc::new(config), RenderMode::Normal)
}

fn render_default(source: &str) -> RenderedMarkdown {
    render(source, RenderConfig::for_locale("en").highlight(false))
}

#[test]
fn markdown_renders_rich_gfm_sample() {
    let sample = r#"
# Title

A paragraph with **strong**, *emphasis*, ~~deleted~~, `inline code`, <mark>mark</mark>, <kbd>Cmd+K</kbd>, and a [link](https://example.com).

> Quote line 1
> Quote line 2

- [ ] task item
- [x] done item
- nested
  - child A
  - child B

1. ordered one
2. ordered two

| Name | Value |
| :--- | ---: |
| alpha | 1 |
| beta | 2 |

---

```rust
fn main() {
    println!("hello");
}
```

![alt text](https://example.com/image.png "caption")
"#;

    let output = render_default(sample);
    let html = output.to_html();

    assert!(html.starts_with("<h1>Title</h1>"));
    assert!(html.contains("<strong>strong</strong>"));
    assert!(html.contains("<em>emphasis</em>"));
    assert!(html.contains("<s>deleted</s>"));
    assert!(html.contains("<code>inline code</code>"));
    assert!(html.contains("<mark>mark</mark>"));
    assert!(html.contains(
        "<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">link</a>"
    ));
    assert!(html.contains("<blockquote><p>Quote line 1\nQuote line 2</p></blockquote>"));
    assert!(html.contains("<input type=\"checkbox\" disabled=\"\">"));
    assert!(html.contains("<input type=\"checkbox\" disabled=\"\" checked=\"\">"));
    assert!(html.contains("<ol><li>ordered one</li><li>ordered two</li></ol>"));
    assert!(html.contains("<th style=\"text-align:left\">Name</th>"));
    assert!(html.contains("<td style=\"text-align:right\">2</td>"));
    assert!(html.contains("<hr>"));
    assert!(html.contains("<code class=\"language-rust\">"));
    assert!(html.contains(
        "<img src=\"https://example.com/image.png\" alt=\"alt text\" title=\"caption\">"
    ));

    assert_eq!(output.tables().len(), 1);
    assert_eq!(output.find_all("li").len(), 7);
}

#[test]
fn bold_renders_single_strong_element() {
    let output = render_default("**bold**");
    assert_eq!(output.blocks.len(), 1);
    let strong = output.find_all("strong");
    assert_eq!(strong.len(), 1);
    assert_eq!(strong[0].text_content(), "bold");
    assert_eq!(output.to_html(), "<p><strong>bold</strong></p>");
}

#[test]
fn soft_and_hard_breaks() {
    let output = render_default("one\ntwo  \nthree");
    assert_eq!(output.to_html(), "<p>one\ntwo<br>three</p>");
}

#[test]
fn footnotes_link_to_their_definition() {
    let output = render_default("Claim[^1].\n\n[^1]: Source.\n");
    let html = output.to_html();
    assert!(html.contains("<sup class=\"footnote-ref\"><a href=\"#fn-1\">1</a></sup>"));
    assert!(html.contains("<div class=\"footnote\" id=\"fn-1\"><p>Source.</p></div>"));
}

#[test]
fn autolinks_and_annotations_render_as_anchors() {
    let output = render_default("see www.rust-lang.org and [x](/local){{class=btn rel=nofollow}}");
    let links = output.find_all("a");
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].attr("href"), Some("http://www.rust-lang.org"));
    assert_eq!(links[0].attr("target"), Some("_blank"));
    assert_eq!(links[1].attr("href"), Some("/local"));
    assert_eq!(links[1].attr("class"), Some("btn"));
    assert_eq!(links[1].attr("rel"), Some("nofollow"));
    assert_eq!(links[1].attr("target"), None);
}

#[test]
fn javascript_links_lose_their_href() {
    let output = render_default("[click](javascript:alert(1))");
    let links = output.find_all("a");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].attr("href"), None);
}

#[test]
fn sanitize_strips_scripts_and_handlers() {
    let source = "<div onclick=\"x()\"><a href=\"https://example.com\">ok</a></div>\n\n<script>alert(1)</script>\n";
    let output = render(source, RenderConfig::for_locale("en").sanitize(true));
    let html = output.to_html();
    assert!(!html.contains("script"));
    assert!(!html.contains("onclick"));
    assert!(html.contains("<a href=\"https://example.com\">ok</a>"));
}

#[test]
fn unsanitized_html_passes_through() {
    let output = render_default("<span class=\"x\">raw</span>");
    assert!(output.to_html().contains("<span class=\"x\">raw</span>"));
}

#[test]
fn broken_html_falls_back_to_text_when_sanitizing() {
    let output = render(
        "<div title=\"open\n",
        RenderConfig::for_locale("en").sanitize(true),
    );
    let html = output.to_html();
    assert!(html.contains("&lt;div"));
}
