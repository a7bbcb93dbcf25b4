use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::error::StepError;
use crate::page::Page;
use crate::types::{PageElement, RawElement};

/// JavaScript evaluated in the page to list candidate interactive elements.
/// READ-ONLY: no attributes, styles or overlays are written.
///
/// The script:
///   1. Considers every element that is natively interactive (a, button,
///      input, textarea, select, iframe, video), has an onclick handler, or
///      shows a pointer cursor.
///   2. Keeps only elements that are actually hit-testable in the viewport
///      with at least 20px² of visible area.
///   3. Drops wrappers that contain another candidate, keeping the innermost.
///   4. Returns text, aria-label, placeholder, enclosing <label> text and an
///      XPath for each survivor, in document order, as a JSON string.
pub const ELEMENTS_JS: &str = r#"
(() => {
  const NATIVE = new Set(['INPUT','TEXTAREA','SELECT','BUTTON','A','IFRAME','VIDEO']);
  const vw = Math.max(document.documentElement.clientWidth || 0, window.innerWidth || 0);
  const vh = Math.max(document.documentElement.clientHeight || 0, window.innerHeight || 0);

  function pathTo(el) {
    if (el.id !== '') return 'id("' + el.id + '")';
    if (el === document.body) return el.tagName;
    let ix = 0;
    const siblings = el.parentNode.childNodes;
    for (let i = 0; i < siblings.length; i++) {
      const sib = siblings[i];
      if (sib === el) return pathTo(el.parentNode) + '/' + el.tagName + '[' + (ix + 1) + ']';
      if (sib.nodeType === 1 && sib.tagName === el.tagName) ix++;
    }
    return '';
  }

  function visibleArea(el) {
    let area = 0;
    for (const bb of el.getClientRects()) {
      const hit = document.elementFromPoint(bb.left + bb.width / 2, bb.top + bb.height / 2);
      if (hit !== el && !el.contains(hit)) continue;
      const w = Math.min(vw, bb.right) - Math.max(0, bb.left);
      const h = Math.min(vh, bb.bottom) - Math.max(0, bb.top);
      if (w > 0 && h > 0) area += w * h;
    }
    return area;
  }

  let items = [];
  for (const el of document.querySelectorAll('*')) {
    const include = NATIVE.has(el.tagName)
      || el.onclick != null
      || window.getComputedStyle(el).cursor === 'pointer';
    if (!include || visibleArea(el) < 20) continue;
    items.push(el);
  }
  items = items.filter(x => !items.some(y => x !== y && x.contains(y)));

  return JSON.stringify(items.map(el => {
    const labelEl = el.closest('label');
    return {
      tag: el.tagName.toLowerCase(),
      text: (el.textContent || '').trim().replace(/\s{2,}/g, ' '),
      ariaLabel: el.getAttribute('aria-label') || '',
      placeholder: el.getAttribute('placeholder') || '',
      label: labelEl ? labelEl.textContent.trim() : '',
      path: pathTo(el),
    };
  }));
})()
"#;

/// Decode the value returned by [`ELEMENTS_JS`].
pub fn parse_script_output(value: Option<Value>) -> Result<Vec<RawElement>> {
    match value.context("extraction script returned nothing")? {
        Value::String(json) => {
            serde_json::from_str(&json).context("extraction script returned malformed JSON")
        }
        value => serde_json::from_value(value).context("extraction script returned an unexpected shape"),
    }
}

/// Lazy, single-pass sequence of the elements from one extraction that carry
/// at least one descriptive signal.
#[derive(Debug)]
pub struct Elements {
    raw: std::vec::IntoIter<RawElement>,
}

impl Elements {
    pub fn new(raw: Vec<RawElement>) -> Self {
        Self {
            raw: raw.into_iter(),
        }
    }
}

impl Iterator for Elements {
    type Item = PageElement;

    fn next(&mut self) -> Option<PageElement> {
        self.raw.by_ref().find_map(PageElement::from_raw)
    }
}

/// The result of one perception pass: where we are and what can be acted on.
#[derive(Debug)]
pub struct Extraction {
    pub url: String,
    pub elements: Elements,
}

/// Read the current URL and candidate elements from the page.
pub async fn extract<P: Page + ?Sized>(page: &mut P) -> Result<Extraction, StepError> {
    let url = page.current_url().await.map_err(StepError::extraction)?;
    let raw = page.raw_elements().await.map_err(StepError::extraction)?;
    debug!(url = %url, candidates = raw.len(), "extracted raw elements");
    Ok(Extraction {
        url,
        elements: Elements::new(raw),
    })
}
