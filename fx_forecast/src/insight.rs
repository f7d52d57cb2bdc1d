//! Plain-language summary of a trend/risk pair

use crate::signals::{RiskLevel, Trend};

fn trend_clause(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "upward",
        Trend::Down => "downward",
        Trend::Flat => "sideways",
    }
}

fn risk_clause(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::High => "high volatility",
        RiskLevel::Med => "moderate volatility",
        RiskLevel::Low => "low volatility",
    }
}

fn advisory(trend: Trend, risk: RiskLevel) -> &'static str {
    if risk == RiskLevel::High {
        return "Nothing is certain; staying cautious, moving in small steps and limiting exposure to sudden moves may be appropriate.";
    }
    match trend {
        Trend::Up => "Nothing is certain; gradual buying could be considered while staying cautious.",
        Trend::Down => "Nothing is certain; staying defensive and not increasing exposure may be more appropriate.",
        Trend::Flat => "Nothing is certain; a wait-and-see approach with reduced risk may be preferable.",
    }
}

/// Compose the insight sentence. High risk overrides the trend advisory.
///
/// ```
/// use fx_forecast::insight::generate;
/// use fx_forecast::signals::{RiskLevel, Trend};
///
/// let text = generate(Trend::Up, RiskLevel::Low);
/// assert!(text.starts_with("Trend looks upward; there is low volatility."));
/// ```
pub fn generate(trend: Trend, risk: RiskLevel) -> String {
    format!(
        "Trend looks {}; there is {}. {}",
        trend_clause(trend),
        risk_clause(risk),
        advisory(trend, risk)
    )
}

/// [`generate`] for raw labels; unknown labels fall back to FLAT and MED
pub fn generate_from_labels(trend: &str, risk: &str) -> String {
    generate(Trend::from_label(trend), RiskLevel::from_label(risk))
}
