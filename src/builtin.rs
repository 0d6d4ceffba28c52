pub const BUILTIN_CSS: &str = include_str!("builtin.css");

/// Sizes the thread line next to each comment list. Exposed as
/// `window.feedRelayout` so whatever applies view patches can call it right
/// after a structural change; it also runs once on load.
pub const RELAYOUT_JS: &str = r#"(function () {
  function relayout() {
    var blocks = document.querySelectorAll(".comments");
    for (var i = 0; i < blocks.length; i++) {
      var block = blocks[i];
      var comments = block.querySelectorAll(":scope > .comment-container");
      if (comments.length === 0) {
        block.style.removeProperty("--line-height");
        continue;
      }
      var first = comments[0];
      var last = comments[comments.length - 1];
      var height = last.offsetTop + last.offsetHeight / 2 - first.offsetTop;
      block.style.setProperty("--line-height", height + "px");
    }
  }

  window.feedRelayout = relayout;
  if (document.readyState === "loading") {
    document.addEventListener("DOMContentLoaded", relayout);
  } else {
    relayout();
  }
})();"#;
