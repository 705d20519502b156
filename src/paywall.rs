//! Paywall sniffing.
//!
//! Paywall detection is site-specific by nature, so the pipeline only sees
//! the [`PaywallPolicy`] trait. The default [`MarkerSniffer`] looks for
//! marker words near the top of the page.

/// Decides whether fetched HTML is likely behind a paywall.
pub trait PaywallPolicy {
    fn is_paywalled(&self, html: &[u8]) -> bool;
}

/// Case-insensitive search for marker strings in the first `window` bytes.
#[derive(Debug, Clone)]
pub struct MarkerSniffer {
    markers: Vec<Vec<u8>>,
    window: usize,
}

impl MarkerSniffer {
    pub fn new<I, S>(markers: I, window: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_ascii_lowercase().into_bytes())
                .filter(|m| !m.is_empty())
                .collect(),
            window,
        }
    }
}

impl Default for MarkerSniffer {
    fn default() -> Self {
        Self::new(["subscribe", "paywall"], 6000)
    }
}

impl PaywallPolicy for MarkerSniffer {
    fn is_paywalled(&self, html: &[u8]) -> bool {
        let head = &html[..html.len().min(self.window)];
        let head = head.to_ascii_lowercase();
        self.markers
            .iter()
            .any(|m| head.windows(m.len()).any(|w| w == m.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_markers_case_insensitively() {
        let sniffer = MarkerSniffer::default();
        assert!(sniffer.is_paywalled(b"<div>Please SUBSCRIBE to continue</div>"));
        assert!(sniffer.is_paywalled(b"<div class=\"PayWall-gate\"></div>"));
        assert!(!sniffer.is_paywalled(b"<p>Free to read</p>"));
    }

    #[test]
    fn test_only_scans_window() {
        let sniffer = MarkerSniffer::default();
        let mut html = vec![b' '; 6000];
        html.extend_from_slice(b"subscribe");
        assert!(!sniffer.is_paywalled(&html));

        let mut html = vec![b' '; 5991];
        html.extend_from_slice(b"subscribe");
        assert!(sniffer.is_paywalled(&html));
    }

    #[test]
    fn test_custom_markers() {
        let sniffer = MarkerSniffer::new(["members only", ""], 100);
        assert!(sniffer.is_paywalled(b"This story is for Members Only."));
        assert!(!sniffer.is_paywalled(b"subscribe"));
    }
}
