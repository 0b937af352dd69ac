//! Shared fixtures for the integration tests

use listing_funnel::config::{load_config, Config};
use std::path::Path;
use wiremock::MockServer;

pub const AMAZON_RESULTS: &str = r#"
<html><body>
  <div data-component-type="s-search-result" data-asin="B08N5WRWNW">
    <h2><a href="/Echo-Dot/dp/B08N5WRWNW"><span>Echo Dot (4th Gen)</span></a></h2>
    <span class="a-price"><span class="a-offscreen">$49.99</span></span>
    <span class="a-icon-alt">4.7 out of 5 stars</span>
  </div>
  <div data-component-type="s-search-result" data-asin="B07XJ8C8F5">
    <h2><span>Fire TV Stick</span></h2>
    <span class="a-price-whole">39.</span><span class="a-price-fraction">99</span>
  </div>
</body></html>"#;

pub const AMAZON_CAPTCHA: &str = r#"
<html><body>
  <h4>Enter the characters you see below</h4>
  <form method="get" action="/errors/validateCaptcha">
    <input type="text" name="field-keywords">
  </form>
</body></html>"#;

pub const MERCADOLIBRE_RESULTS: &str = r#"
<html><body><ol>
  <li class="ui-search-layout__item">
    <div class="poly-card">
      <a class="poly-component__title" href="https://articulo.mercadolibre.com.co/MCO-1234567890-portatil">Portátil Lenovo IdeaPad 3</a>
      <div class="poly-price__current">
        <span class="andes-money-amount__currency-symbol">$</span>
        <span class="andes-money-amount__fraction">1.899.900</span>
      </div>
    </div>
  </li>
</ol></body></html>"#;

pub const MERCADOLIBRE_API_RESULTS: &str = r#"{
  "paging": {"total": 2},
  "results": [
    {"id": "MCO555", "title": "Portátil HP 14", "price": 1599900, "currency_id": "COP",
     "permalink": "https://articulo.mercadolibre.com.co/MCO-555-portatil-hp"},
    {"id": "MCO777", "title": "Portátil Asus", "price": 2199900.5, "currency_id": "COP"}
  ]
}"#;

/// Writes a config file whose endpoints all point at `server`
///
/// `searches` is appended verbatim and should hold `[[search]]` tables.
pub fn write_config(dir: &Path, server: &MockServer, persist: bool, searches: &str) -> Config {
    let uri = server.uri();
    let cache_path = dir.join("cache.db");
    let contents = format!(
        r#"
[funnel]
max-concurrent-targets = 2
challenge-limit = 2

[retry]
max-attempts = 3
base-delay-ms = 1
max-delay-ms = 5
jitter-ms = 0

[cache]
path = "{cache}"
persist = {persist}

[http]
timeout-secs = 5
connect-timeout-secs = 2

[browser]
enabled = false

[endpoints]
amazon = "{uri}"
mercadolibre-listings = "{uri}"
mercadolibre-api = "{uri}"

{searches}
"#,
        cache = cache_path.display().to_string().replace('\\', "/"),
        persist = persist,
        uri = uri,
        searches = searches,
    );

    let path = dir.join("funnel.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    load_config(&path).expect("Config should be valid")
}
