//! CDP-backed [`PageDriver`].
//!
//! DOM queries run as small injected scripts through `Runtime.evaluate`;
//! clicks and key presses go through the Input domain so the page sees
//! trusted events.

use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;
use wadriver_core::{Error, Result};

use crate::cdp::{CdpClient, Clip};
use crate::driver::{PageDriver, Probe, RowRecord};
use crate::keys::KeySpec;

/// Locates the first visible element whose own text matches `needle`.
const FIND_TEXT_FN: &str = r#"(function(needle, exact) {
  const want = exact ? needle.trim() : needle.trim().toLowerCase();
  for (const el of document.querySelectorAll('body *')) {
    const own = Array.from(el.childNodes)
      .filter(n => n.nodeType === Node.TEXT_NODE)
      .map(n => n.textContent)
      .join('')
      .trim();
    if (!own) continue;
    const hit = exact ? own === want : own.toLowerCase().includes(want);
    if (!hit) continue;
    const r = el.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) continue;
    return el;
  }
  return null;
})"#;

const READ_ROWS_FN: &str = r#"(function(rowSelector, probes, limit) {
  const clean = v => {
    if (v === null || v === undefined) return null;
    const t = String(v).trim();
    return t.length ? t : null;
  };
  return Array.from(document.querySelectorAll(rowSelector)).slice(0, limit).map(row => ({
    text: (row.textContent || '').trim(),
    values: probes.map(p => {
      const els = row.querySelectorAll(p.selector);
      if (!els.length) return null;
      const el = p.pick === 'last' ? els[els.length - 1] : els[0];
      return clean(p.read === 'text' ? el.textContent : el.getAttribute(p.read.attr));
    }),
  }));
})"#;

pub struct CdpPage {
    cdp: CdpClient,
    navigation_timeout: Duration,
}

impl CdpPage {
    pub fn new(cdp: CdpClient, navigation_timeout: Duration) -> Self {
        Self {
            cdp,
            navigation_timeout,
        }
    }

    pub(crate) fn cdp(&self) -> &CdpClient {
        &self.cdp
    }

    async fn eval(&self, js: &str) -> Result<Value> {
        Ok(self.cdp.evaluate(js).await?)
    }

    /// Scroll the element produced by `element_expr` into view and click its
    /// center with real mouse events; falls back to `el.click()` for
    /// elements without a layout box.
    async fn click_resolved(&self, element_expr: &str, what: &str) -> Result<()> {
        let js = format!(
            concat!(
                "(() => {{ const el = {};",
                " if (!el) return null;",
                " el.scrollIntoView({{block: 'center'}});",
                " const r = el.getBoundingClientRect();",
                " if (r.width === 0 || r.height === 0) {{ el.click(); return {{clicked: true}}; }}",
                " return {{x: r.left + r.width / 2, y: r.top + r.height / 2}}; }})()"
            ),
            element_expr
        );
        let target = self.eval(&js).await?;
        if target.is_null() {
            return Err(Error::ElementNotFound(what.to_string()));
        }
        if target.get("clicked").is_some() {
            return Ok(());
        }
        let x = target.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y = target.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(self.cdp.click_at(x, y).await?)
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.cdp.navigate(url).await?;

        // The old document can still report "complete" right after
        // Page.navigate returns.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let start = Instant::now();
        loop {
            if start.elapsed() > self.navigation_timeout {
                return Err(Error::Timeout(format!(
                    "Page load of {} did not complete within {}s",
                    url,
                    self.navigation_timeout.as_secs()
                )));
            }
            match self.cdp.evaluate("document.readyState").await {
                Ok(state) if state.as_str() == Some("complete") => return Ok(()),
                Ok(_) => {}
                // Execution context is torn down mid-navigation
                Err(e) => debug!(error = %e, "readyState probe failed, retrying"),
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.eval("location.href").await?;
        Ok(url.as_str().unwrap_or_default().to_string())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let js = format!("document.querySelectorAll({}).length", js_str(selector));
        let n = self.eval(&js).await?;
        Ok(n.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let js = format!(
            concat!(
                "(() => {{ const el = document.querySelector({});",
                " if (!el) return false;",
                " const r = el.getBoundingClientRect();",
                " const s = getComputedStyle(el);",
                " return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()"
            ),
            js_str(selector)
        );
        Ok(self.eval(&js).await?.as_bool().unwrap_or(false))
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.getAttribute({}) : null; }})()",
            js_str(selector),
            js_str(name)
        );
        let value = self.eval(&js).await?;
        Ok(value.as_str().map(|s| s.to_string()))
    }

    async fn has_text(&self, text: &str, exact: bool) -> Result<bool> {
        let js = format!("!!{}({}, {})", FIND_TEXT_FN, js_str(text), exact);
        Ok(self.eval(&js).await?.as_bool().unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let expr = format!("document.querySelector({})", js_str(selector));
        self.click_resolved(&expr, selector).await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let expr = format!("document.querySelectorAll({})[{}]", js_str(selector), index);
        self.click_resolved(&expr, &format!("{} #{}", selector, index))
            .await
    }

    async fn click_text(&self, text: &str, exact: bool) -> Result<()> {
        let expr = format!("{}({}, {})", FIND_TEXT_FN, js_str(text), exact);
        self.click_resolved(&expr, &format!("text '{}'", text)).await
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); return true; }})()",
            js_str(selector)
        );
        if self.eval(&js).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::ElementNotFound(selector.to_string()))
        }
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        Ok(self.cdp.insert_text(text).await?)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        Ok(self.cdp.press(&KeySpec::parse(key)).await?)
    }

    async fn scroll_by(&self, selector: &str, delta_y: i64) -> Result<()> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.scrollTop += {}; return true; }})()",
            js_str(selector),
            delta_y
        );
        if self.eval(&js).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::ElementNotFound(selector.to_string()))
        }
    }

    async fn read_rows(
        &self,
        row_selector: &str,
        probes: &[Probe],
        limit: usize,
    ) -> Result<Vec<RowRecord>> {
        let probes_json = serde_json::to_string(probes)?;
        let js = format!(
            "{}({}, {}, {})",
            READ_ROWS_FN,
            js_str(row_selector),
            probes_json,
            limit
        );
        let value = self.eval(&js).await?;
        Ok(parse_rows(&value, probes.len()))
    }

    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>> {
        let clip = match selector {
            Some(sel) => {
                let js = format!(
                    concat!(
                        "(() => {{ const el = document.querySelector({});",
                        " if (!el) return null;",
                        " el.scrollIntoView({{block: 'center'}});",
                        " const r = el.getBoundingClientRect();",
                        " return [r.left + window.scrollX, r.top + window.scrollY, r.width, r.height]; }})()"
                    ),
                    js_str(sel)
                );
                let rect = self.eval(&js).await?;
                let nums: Vec<f64> = rect
                    .as_array()
                    .ok_or_else(|| Error::ElementNotFound(sel.to_string()))?
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .collect();
                match nums.as_slice() {
                    [x, y, w, h] if *w > 0.0 && *h > 0.0 => Some(Clip::new(*x, *y, *w, *h)),
                    _ => return Err(Error::ElementNotFound(sel.to_string())),
                }
            }
            None => None,
        };
        Ok(self.cdp.screenshot(clip).await?)
    }
}

/// Quote a Rust string as a JavaScript string literal.
fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn parse_rows(value: &Value, probe_count: usize) -> Vec<RowRecord> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let text = row
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let mut values: Vec<Option<String>> = row
                .get("values")
                .and_then(|v| v.as_array())
                .map(|vals| {
                    vals.iter()
                        .map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            values.resize(probe_count, None);
            RowRecord { text, values }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_js_str_escapes_quotes() {
        assert_eq!(js_str(r#"span[title="Ada"]"#), r#""span[title=\"Ada\"]""#);
        assert_eq!(js_str("it's"), r#""it's""#);
    }

    #[test]
    fn test_parse_rows_pads_missing_values() {
        let raw = json!([
            {"text": "Ada  hi", "values": ["Ada", null]},
            {"text": "Bob", "values": ["Bob"]},
            {"values": []}
        ]);
        let rows = parse_rows(&raw, 2);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value(0), Some("Ada"));
        assert_eq!(rows[0].value(1), None);
        assert_eq!(rows[1].values.len(), 2);
        assert_eq!(rows[2].text, "");
    }

    #[test]
    fn test_parse_rows_non_array() {
        assert!(parse_rows(&Value::Null, 1).is_empty());
    }

    #[test]
    fn test_probe_serialization_matches_script() {
        let probes = [
            Probe::attr("[title]", "title"),
            Probe::text("span[dir=\"auto\"]").last(),
        ];
        let json = serde_json::to_value(probes).unwrap();
        assert_eq!(json[0]["read"]["attr"], "title");
        assert_eq!(json[0]["pick"], "first");
        assert_eq!(json[1]["read"], "text");
        assert_eq!(json[1]["pick"], "last");
    }
}
