use std::sync::Arc;
use std::time::Duration;

use calmchat::prelude::*;
use futures::executor::{ThreadPool, block_on};

fn view(throttle: Duration) -> MarkdownView {
    let pool = ThreadPool::builder()
        .pool_size(1)
        .create()
        .expect("thread pool");
    MarkdownView::new(
        RenderConfig::for_locale("en").highlight(false),
        ViewOptions::default().throttle(throttle),
        pool,
    )
}

#[test]
fn streamed_table_shows_one_skeleton_then_settles() {
    let view = view(Duration::from_secs(30));
    view.set_streaming(true).expect("streaming on");

    let chunks = [
        "Results:\n\n",
        "| name | score |\n",
        "|---|---:|\n",
        "| ada | 3 |\n",
        "| bob",
        " | 5 |\n",
    ];

    let mut loading_frames = 0;
    let mut last_output: Option<Arc<RenderedMarkdown>> = None;
    for chunk in chunks {
        view.append_markdown(chunk).expect("append");
        view.flush();
        let output = view.output().expect("output");
        let changed = last_output
            .as_ref()
            .is_none_or(|previous| !Arc::ptr_eq(previous, &output));
        if changed && output.is_loading() {
            loading_frames += 1;
        }
        last_output = Some(output);
    }
    assert_eq!(loading_frames, 1);

    view.set_streaming(false).expect("streaming off");
    view.flush();
    block_on(view.when_settled());

    let output = view.output().expect("output");
    assert!(!output.is_loading());
    let tables = output.tables();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].rows.len(), 2);
    assert_eq!(tables[0].rows[1][0].text, "bob");
}

#[test]
fn paragraph_after_table_releases_streaming_gate() {
    let view = view(Duration::from_secs(30));
    view.set_streaming(true).expect("streaming on");
    view.set_markdown("| a |\n|---|\n| 1 |\n").expect("set");
    view.flush();
    assert!(view.output().expect("output").is_loading());

    view.append_markdown("\nDone.").expect("append");
    view.flush();
    let output = view.output().expect("output");
    assert!(!output.is_loading());
    assert!(output.to_html().ends_with("<p>Done.</p>"));
}

#[test]
fn rapid_updates_render_at_most_once_per_window() {
    let view = view(Duration::from_millis(150));
    for index in 0..20 {
        view.set_markdown(format!("update {index}")).expect("set");
    }
    block_on(view.when_settled());

    assert_eq!(view.output().expect("output").text_content(), "update 19");
    assert!(view.render_count() <= 3, "rendered {} times", view.render_count());
}

#[test]
fn sanitized_view_output_has_no_scripts() {
    let view = view(Duration::from_millis(10));
    view.set_config(RenderConfig::for_locale("en").sanitize(true))
        .expect("config");
    view.set_markdown("<p onclick=\"evil()\">hi</p>\n\n<script>steal()</script>\n")
        .expect("set");
    view.flush();
    block_on(view.when_settled());

    let html = view.output().expect("output").to_html();
    assert!(html.contains("<p>hi</p>"));
    assert!(!html.contains("onclick"));
    assert!(!html.contains("steal"));
}

#[test]
fn disposed_view_stops_rendering() {
    let view = view(Duration::from_millis(20));
    view.set_markdown("first").expect("set");
    view.set_markdown("second").expect("set");
    view.dispose();
    block_on(view.when_settled());
    assert_eq!(view.output().expect("output").text_content(), "first");
    assert_eq!(view.append_markdown("!"), Err(MarkdownError::Disposed));
}
