use std::fmt;

/// Payload format of an extracted archive member, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberFormat {
    Csv,
    GeoPackage,
    Zip,
    Other,
}

impl MemberFormat {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            MemberFormat::Csv
        } else if lower.ends_with(".gpkg") {
            MemberFormat::GeoPackage
        } else if lower.ends_with(".zip") {
            MemberFormat::Zip
        } else {
            MemberFormat::Other
        }
    }
}

impl fmt::Display for MemberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberFormat::Csv => "csv",
            MemberFormat::GeoPackage => "gpkg",
            MemberFormat::Zip => "zip",
            MemberFormat::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// One file pulled out of an archive. Lives only for the duration of a load.
#[derive(Debug, Clone)]
pub struct RawMember {
    /// Member path inside the (innermost) archive.
    pub name: String,
    /// File name of the nested zip the member came from, if any.
    pub container: Option<String>,
    pub bytes: Vec<u8>,
    pub format: MemberFormat,
}

impl RawMember {
    pub fn new(name: String, bytes: Vec<u8>) -> Self {
        let format = MemberFormat::from_name(&name);
        Self {
            name,
            container: None,
            bytes,
            format,
        }
    }

    pub fn nested(container: String, name: String, bytes: Vec<u8>) -> Self {
        Self {
            container: Some(container),
            ..Self::new(name, bytes)
        }
    }
}
