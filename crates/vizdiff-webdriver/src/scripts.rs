//! Page-side scripts executed through WebDriver `execute`.
//!
//! Scripts receive their parameters through `arguments` and return plain JSON.
//! Rectangles are in page coordinates (viewport rect plus scroll offset).

/// `[readyState, resourceEntryCount]`
pub const LOAD_STATE: &str = r#"
return [document.readyState, performance.getEntriesByType('resource').length];
"#;

/// `arguments[0]`: selector. Returns whether a visible match exists.
pub const SELECTOR_VISIBLE: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
const r = el.getBoundingClientRect();
const s = window.getComputedStyle(el);
return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
"#;

/// `arguments[0]`: selector. Returns the first match's page rect or null.
pub const BOUNDING_BOX: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return null; }
const r = el.getBoundingClientRect();
return { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height };
"#;

/// `arguments[0]`: selector. Dispatches pointer-over events on the first match.
pub const HOVER: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
el.scrollIntoView({ block: 'nearest' });
const r = el.getBoundingClientRect();
const opts = { bubbles: true, cancelable: true, view: window,
               clientX: r.left + r.width / 2, clientY: r.top + r.height / 2 };
for (const type of ['pointerover', 'pointerenter', 'mouseover', 'mouseenter', 'mousemove']) {
  const Ctor = type.startsWith('pointer') && window.PointerEvent ? PointerEvent : MouseEvent;
  el.dispatchEvent(new Ctor(type, opts));
}
return true;
"#;

/// `arguments[0]`: selector, `arguments[1]`: CSS property names.
/// Returns every match in document order.
pub const COMPUTED_STYLES: &str = r#"
const props = arguments[1];
return Array.from(document.querySelectorAll(arguments[0])).map((el) => {
  const cs = window.getComputedStyle(el);
  const r = el.getBoundingClientRect();
  const styles = {};
  for (const p of props) { styles[p] = cs.getPropertyValue(p); }
  return {
    text: el.innerText || el.textContent || '',
    role: el.getAttribute('role'),
    bounds: { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height },
    styles: styles,
  };
});
"#;

/// `arguments[0]`, `arguments[1]`: target scroll. Returns the resulting
/// `[scrollX, scrollY, innerWidth, innerHeight]`.
pub const SCROLL_TO: &str = r#"
window.scrollTo(arguments[0], arguments[1]);
return [window.scrollX, window.scrollY, window.innerWidth, window.innerHeight];
"#;

/// `[outerWidth - innerWidth, outerHeight - innerHeight]`
pub const CHROME_SIZE: &str = r#"
return [window.outerWidth - window.innerWidth, window.outerHeight - window.innerHeight];
"#;
