// build.rs

//! Compiles `locales/*.toml` into the `t!` macro used for every user-facing
//! message of the engine (validator rejections, the command picker, timeline
//! labels). Each key expands to a string literal, so `t!` also works as a
//! `format!` template. English is always loaded and other catalogs are
//! merged over it, key by key.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

const BASE_CATALOG: &str = "en";

type Catalog = BTreeMap<String, String>;

fn main() {
    println!("cargo:rerun-if-env-changed=LANES_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    let lang = catalog_language();
    println!("cargo:rustc-env=LANES_LANG_EFFECTIVE={}", lang);

    let mut catalog = read_catalog(BASE_CATALOG)
        .unwrap_or_else(|| panic!("locales/{}.toml is required", BASE_CATALOG));
    if lang != BASE_CATALOG {
        match read_catalog(&lang) {
            Some(overrides) => catalog.extend(overrides),
            None => println!(
                "cargo:warning=No catalog for '{}', messages stay in '{}'.",
                lang, BASE_CATALOG
            ),
        }
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is always set by Cargo");
    fs::write(Path::new(&out_dir).join("translations.rs"), render_macro(&catalog))
        .expect("Failed to write translations.rs");
}

/// A `lang_*` feature wins over `LANES_LANG`. With several features enabled
/// the alphabetically first one is used.
fn catalog_language() -> String {
    let mut features: Vec<String> = env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("CARGO_FEATURE_LANG_")
                .map(str::to_lowercase)
        })
        .collect();
    features.sort();

    match features.as_slice() {
        [] => env::var("LANES_LANG").unwrap_or_else(|_| BASE_CATALOG.to_string()),
        [only] => only.clone(),
        [first, ..] => {
            println!(
                "cargo:warning=Several lang_* features enabled ({:?}), using '{}'.",
                features, first
            );
            first.clone()
        }
    }
}

fn read_catalog(lang: &str) -> Option<Catalog> {
    let path = format!("locales/{}.toml", lang);
    let content = fs::read_to_string(&path).ok()?;
    let catalog = toml::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse {}: {}", path, e));
    Some(catalog)
}

/// One arm per key, in key order. Unknown keys fail the build.
fn render_macro(catalog: &Catalog) -> String {
    let mut code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, message) in catalog {
        let literal = message.replace('\\', "\\\\").replace('"', "\\\"");
        code.push_str(&format!("    (\"{}\") => {{ \"{}\" }};\n", key, literal));
    }
    code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    code.push_str("}\n");
    code
}
