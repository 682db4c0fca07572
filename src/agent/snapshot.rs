//! Page snapshots: the fine-grained candidate list used for element
//! resolution and the coarse page analysis used as planning context.

use crate::agent::page::{BrowserResult, LivePage};
use crate::agent::types::{CandidateElement, PageAnalysis, PageElement, SiteCategory};
use serde_json::Value;

/// Number of main-element texts reported as key features
const KEY_FEATURE_COUNT: usize = 5;

/// Collects every visible node that is a link, a native button, has
/// `role="button"`, an `onclick` attribute or a `tabindex`, in DOM order.
const CANDIDATES_JS: &str = r#"/* candidates */ (function() {
    const clean = (s) => (s || "").replace(/\s+/g, " ").trim();
    const attr = (el, name) => {
        const v = el.getAttribute(name);
        return v && v.trim() ? v : null;
    };
    const nodes = document.querySelectorAll('a, button, [onclick], [tabindex], [role="button"]');
    const out = [];
    for (const el of nodes) {
        const rect = el.getBoundingClientRect();
        const visible = (rect.width > 0 && rect.height > 0) || el.getClientRects().length > 0;
        if (!visible) continue;
        const attributes = {};
        for (const a of el.attributes) {
            attributes[a.name] = a.value;
        }
        out.push({
            index: out.length,
            tag: el.tagName.toLowerCase(),
            text: clean(el.innerText || el.textContent),
            ariaLabel: attr(el, "aria-label"),
            title: attr(el, "title"),
            dataTestid: attr(el, "data-testid"),
            attributes: attributes,
            parentText: el.parentElement ? clean(el.parentElement.innerText) || null : null,
            visible: true,
            enabled: !el.disabled && el.getAttribute("aria-disabled") !== "true",
            boundingBox: {x: rect.x, y: rect.y, width: rect.width, height: rect.height}
        });
    }
    return out;
})()"#;

/// Scans a fixed selector set and reports at most `__CAP__` elements with a
/// non-empty box. Zero-size nodes never take a slot.
const ANALYSIS_JS: &str = r#"/* analysis */ (function(cap) {
    const selectors = ['button', 'a', 'input', 'select', 'textarea', '[role="button"]', '[onclick]', '[href]'];
    const out = [];
    for (const selector of selectors) {
        const nodes = document.querySelectorAll(selector);
        for (let i = 0; i < nodes.length; i++) {
            const el = nodes[i];
            const rect = el.getBoundingClientRect();
            if (rect.width <= 0 || rect.height <= 0) continue;
            if (out.length >= cap) return out;
            out.push({
                selector: selector + ":nth-child(" + (i + 1) + ")",
                text: (el.textContent || "").trim().slice(0, 50),
                type: el.tagName.toLowerCase(),
                visible: rect.top >= 0 && rect.left >= 0,
                clickable: true,
                ariaLabel: el.getAttribute("aria-label"),
                role: el.getAttribute("role")
            });
        }
    }
    return out;
})(__CAP__)"#;

/// Extract the candidate elements of the live page.
///
/// An empty page yields an empty list, not an error.
pub async fn extract_candidates(page: &dyn LivePage) -> BrowserResult<Vec<CandidateElement>> {
    let value = page.evaluate(CANDIDATES_JS).await?;
    if value.is_null() {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<CandidateElement> = serde_json::from_value(value)?;
    // Indexes are positions in this snapshot, whatever the page reported
    for (position, candidate) in candidates.iter_mut().enumerate() {
        candidate.index = position;
    }

    tracing::debug!("Extracted {} candidate elements", candidates.len());
    Ok(candidates)
}

/// Build the coarse page summary fed to the planner
pub async fn analyze_page(page: &dyn LivePage, cap: usize) -> BrowserResult<PageAnalysis> {
    let href = page.url().await?;
    let title = page.title().await?;
    let script = ANALYSIS_JS.replace("__CAP__", &cap.to_string());

    let elements: Vec<PageElement> = match page.evaluate(&script).await? {
        Value::Null => Vec::new(),
        value => serde_json::from_value(value)?,
    };

    let domain = domain_of(&href);
    let mut analysis = classify_elements(elements.into_iter().take(cap).collect());
    analysis.category = infer_category(&domain);
    analysis.domain = domain;
    analysis.title = title;

    tracing::debug!(
        "Analyzed {} ({}): {} main, {} navigation, {} actionable",
        analysis.domain,
        analysis.category,
        analysis.main_elements.len(),
        analysis.navigation_elements.len(),
        analysis.actionable_elements.len()
    );
    Ok(analysis)
}

/// Host part of a URL, empty when it has none
pub fn domain_of(href: &str) -> String {
    url::Url::parse(href)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Split scanned elements into main, navigation and actionable groups and
/// derive key features. Domain, title and category are left empty.
pub fn classify_elements(elements: Vec<PageElement>) -> PageAnalysis {
    let main_elements: Vec<PageElement> = elements
        .iter()
        .filter(|e| {
            e.element_type == "button" || e.element_type == "a" || e.role.as_deref() == Some("button")
        })
        .cloned()
        .collect();

    let navigation_elements = elements
        .iter()
        .filter(|e| {
            let text = e.text.to_lowercase();
            text.contains("nav") || text.contains("menu") || e.role.as_deref() == Some("navigation")
        })
        .cloned()
        .collect();

    let actionable_elements = elements
        .iter()
        .filter(|e| e.clickable && e.visible)
        .cloned()
        .collect();

    let key_features = main_elements
        .iter()
        .map(|e| e.text.trim())
        .filter(|t| !t.is_empty())
        .take(KEY_FEATURE_COUNT)
        .map(str::to_string)
        .collect();

    PageAnalysis {
        main_elements,
        navigation_elements,
        actionable_elements,
        key_features,
        ..Default::default()
    }
}

/// Category from well-known domain substrings
pub fn infer_category(domain: &str) -> SiteCategory {
    let domain = domain.to_lowercase();
    if domain.contains("github") {
        SiteCategory::Development
    } else if domain.contains("shopify") {
        SiteCategory::Ecommerce
    } else if domain.contains("twitter") || domain.contains("x.com") {
        SiteCategory::Social
    } else if domain.contains("linkedin") {
        SiteCategory::Professional
    } else {
        SiteCategory::General
    }
}
