use std::fmt;
use std::str::FromStr;

use crate::ReportingError;

/// Supported citation styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Ieee,
    Apa,
    Mla,
    Chicago,
    Harvard,
}

impl Style {
    pub const ALL: [Style; 5] = [
        Style::Ieee,
        Style::Apa,
        Style::Mla,
        Style::Chicago,
        Style::Harvard,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Style::Ieee => "ieee",
            Style::Apa => "apa",
            Style::Mla => "mla",
            Style::Chicago => "chicago",
            Style::Harvard => "harvard",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = ReportingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ieee" => Ok(Style::Ieee),
            "apa" | "apa7" => Ok(Style::Apa),
            "mla" | "mla9" => Ok(Style::Mla),
            "chicago" => Ok(Style::Chicago),
            "harvard" => Ok(Style::Harvard),
            _ => Err(ReportingError::UnknownStyle(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_round_trip() {
        for style in Style::ALL {
            assert_eq!(style.to_string().parse::<Style>().unwrap(), style);
        }
        assert_eq!(" APA ".parse::<Style>().unwrap(), Style::Apa);
        assert!(matches!(
            "vancouver".parse::<Style>(),
            Err(ReportingError::UnknownStyle(_))
        ));
    }
}
