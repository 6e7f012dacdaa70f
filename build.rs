use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_LOCALE: &str = "en";

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let locales_dir = manifest_dir.join("locales");
    println!("cargo:rerun-if-changed={}", locales_dir.display());

    let mut locales = BTreeMap::<String, BTreeMap<String, String>>::new();
    if let Ok(entries) = fs::read_dir(&locales_dir) {
        let mut paths = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect::<Vec<_>>();
        paths.sort();

        for path in paths {
            println!("cargo:rerun-if-changed={}", path.display());
            let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            locales.insert(locale.to_string(), load_catalog(&path));
        }
    }

    let mut generated = String::new();
    writeln!(generated, "pub const DEFAULT_LOCALE: &str = {DEFAULT_LOCALE:?};").unwrap();
    writeln!(
        generated,
        "pub static LOCALES: &[(&str, &[(&str, &str)])] = &["
    )
    .unwrap();
    for (locale, entries) in &locales {
        writeln!(generated, "    ({locale:?}, &[").unwrap();
        for (key, value) in entries {
            writeln!(generated, "        ({key:?}, {value:?}),").unwrap();
        }
        writeln!(generated, "    ]),").unwrap();
    }
    writeln!(generated, "];").unwrap();

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("out dir"));
    fs::write(out_dir.join("calmchat_i18n_generated.rs"), generated)
        .expect("write generated i18n catalog");
}

fn load_catalog(path: &Path) -> BTreeMap<String, String> {
    let raw = fs::read_to_string(path)
        .unwrap_or_else(|error| panic!("read {}: {error}", path.display()));
    let table = toml::from_str::<toml::Table>(&raw)
        .unwrap_or_else(|error| panic!("parse {}: {error}", path.display()));

    let mut entries = BTreeMap::new();
    flatten("", &table, &mut entries);
    entries
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let composed = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(text) => {
                out.insert(composed, text.clone());
            }
            toml::Value::Table(nested) => flatten(&composed, nested, out),
            other => panic!("unsupported catalog value at {composed}: {other:?}"),
        }
    }
}
