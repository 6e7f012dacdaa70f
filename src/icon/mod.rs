use std::borrow::Cow;

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/icons/"]
struct BuiltinIcons;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IconName {
    Copy,
    Check,
    Download,
    ChevronDown,
    ChevronUp,
    Search,
}

impl IconName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Check => "check",
            Self::Download => "download",
            Self::ChevronDown => "chevron-down",
            Self::ChevronUp => "chevron-up",
            Self::Search => "search",
        }
    }

    fn file_name(self) -> String {
        format!("{}.svg", self.as_str())
    }
}

pub fn svg(name: IconName) -> Option<Cow<'static, str>> {
    let file = BuiltinIcons::get(&name.file_name())?;
    match file.data {
        Cow::Borrowed(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        Cow::Owned(bytes) => String::from_utf8(bytes).ok().map(Cow::Owned),
    }
}

pub fn builtin_names() -> Vec<String> {
    let mut names = BuiltinIcons::iter()
        .filter_map(|path| path.strip_suffix(".svg").map(str::to_string))
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_icon_name_resolves_to_svg() {
        for name in [
            IconName::Copy,
            IconName::Check,
            IconName::Download,
            IconName::ChevronDown,
            IconName::ChevronUp,
            IconName::Search,
        ] {
            let markup = svg(name).unwrap_or_else(|| panic!("missing icon {}", name.as_str()));
            assert!(markup.trim_start().starts_with("<svg"));
        }
    }

    #[test]
    fn builtin_names_are_sorted() {
        let names = builtin_names();
        assert!(names.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(names.iter().any(|name| name == "copy"));
    }
}
