//! # Listado de Directorios
//! src/http/listing.rs
//!
//! Genera la página HTML que se devuelve cuando se pide un directorio sin
//! `index.html`. Un link por entrada, en el orden en que llegan.

/// Genera el HTML del listado
///
/// `request_path` es el path pedido por el cliente (ya decodificado); los
/// links se arman como absolutos a partir de él.
///
/// # Ejemplo
/// ```
/// use dispatch_server::http::listing::render_listing;
///
/// let html = render_listing("/docs", ["a.txt".to_string()]);
/// assert!(html.contains(r#"<a href="/docs/a.txt">a.txt</a>"#));
/// ```
pub fn render_listing<I>(request_path: &str, entries: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let base = if request_path.ends_with('/') {
        request_path.to_string()
    } else {
        format!("{}/", request_path)
    };

    let title = escape_html(&base);
    let mut html = format!(
        "<html>\n<head><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n"
    );

    for name in entries {
        let href = escape_html(&format!("{}{}", encode_path(&base), encode_path(&name)));
        html.push_str(&format!(
            "<a href=\"{}\">{}</a><br/>\n",
            href,
            escape_html(&name)
        ));
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Codifica con `%XX` todo lo que no sea seguro en un path (deja `/`)
fn encode_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
