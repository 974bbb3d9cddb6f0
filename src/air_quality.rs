use serde::{Deserialize, Serialize};

use crate::forecast::types::AirComponents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PollutantLevel {
    Excellent,
    Good,
    Moderate,
    Poor,
    VeryPoor,
    Hazardous,
}

impl PollutantLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Poor => "poor",
            Self::VeryPoor => "very poor",
            Self::Hazardous => "hazardous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pollutant {
    Pm2_5,
    Pm10,
    O3,
    No2,
    No,
    So2,
    Co,
    Nh3,
}

pub const ALL_POLLUTANTS: [Pollutant; 8] = [
    Pollutant::Pm2_5,
    Pollutant::Pm10,
    Pollutant::O3,
    Pollutant::No2,
    Pollutant::No,
    Pollutant::So2,
    Pollutant::Co,
    Pollutant::Nh3,
];

impl Pollutant {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Pm2_5 => "PM2.5",
            Self::Pm10 => "PM10",
            Self::O3 => "O3",
            Self::No2 => "NO2",
            Self::No => "NO",
            Self::So2 => "SO2",
            Self::Co => "CO",
            Self::Nh3 => "NH3",
        }
    }

    /// Upper bounds (µg/m³, exclusive) of Excellent..VeryPoor; above the last is Hazardous.
    fn thresholds(&self) -> [f64; 5] {
        match self {
            Self::Pm2_5 => [12.0, 35.0, 55.0, 150.0, 250.0],
            Self::Pm10 => [54.0, 154.0, 254.0, 354.0, 424.0],
            Self::O3 => [60.0, 120.0, 180.0, 240.0, 380.0],
            Self::No2 => [40.0, 90.0, 120.0, 230.0, 340.0],
            Self::No => [40.0, 90.0, 150.0, 280.0, 400.0],
            Self::So2 => [40.0, 80.0, 380.0, 800.0, 1600.0],
            Self::Co => [4400.0, 9400.0, 12400.0, 15400.0, 30400.0],
            Self::Nh3 => [10.0, 50.0, 100.0, 200.0, 400.0],
        }
    }

    pub fn value(&self, components: &AirComponents) -> f64 {
        match self {
            Self::Pm2_5 => components.pm2_5,
            Self::Pm10 => components.pm10,
            Self::O3 => components.o3,
            Self::No2 => components.no2,
            Self::No => components.no,
            Self::So2 => components.so2,
            Self::Co => components.co,
            Self::Nh3 => components.nh3,
        }
    }

    pub fn level(&self, value: f64) -> PollutantLevel {
        const LEVELS: [PollutantLevel; 5] = [
            PollutantLevel::Excellent,
            PollutantLevel::Good,
            PollutantLevel::Moderate,
            PollutantLevel::Poor,
            PollutantLevel::VeryPoor,
        ];

        self.thresholds()
            .iter()
            .zip(LEVELS)
            .find(|(upper, _)| value < **upper)
            .map(|(_, level)| level)
            .unwrap_or(PollutantLevel::Hazardous)
    }
}

/// OpenWeather's 1..=5 air quality index.
pub fn aqi_label(aqi: u8) -> &'static str {
    match aqi {
        1 => "Good",
        2 => "Fair",
        3 => "Moderate",
        4 => "Poor",
        5 => "Very poor",
        _ => "Unknown",
    }
}

/// Pollutants sorted worst first.
pub fn rank_pollutants(components: &AirComponents) -> Vec<(Pollutant, f64, PollutantLevel)> {
    let mut ranked: Vec<_> = ALL_POLLUTANTS
        .iter()
        .map(|p| {
            let value = p.value(components);
            (*p, value, p.level(value))
        })
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pm2_5_levels() {
        assert_eq!(Pollutant::Pm2_5.level(0.0), PollutantLevel::Excellent);
        assert_eq!(Pollutant::Pm2_5.level(11.9), PollutantLevel::Excellent);
        assert_eq!(Pollutant::Pm2_5.level(12.0), PollutantLevel::Good);
        assert_eq!(Pollutant::Pm2_5.level(54.9), PollutantLevel::Moderate);
        assert_eq!(Pollutant::Pm2_5.level(149.0), PollutantLevel::Poor);
        assert_eq!(Pollutant::Pm2_5.level(200.0), PollutantLevel::VeryPoor);
        assert_eq!(Pollutant::Pm2_5.level(250.0), PollutantLevel::Hazardous);
    }

    #[test]
    fn test_co_uses_its_own_scale() {
        assert_eq!(Pollutant::Co.level(230.0), PollutantLevel::Excellent);
        assert_eq!(Pollutant::Co.level(10_000.0), PollutantLevel::Moderate);
    }

    #[test]
    fn test_aqi_label() {
        assert_eq!(aqi_label(1), "Good");
        assert_eq!(aqi_label(5), "Very poor");
        assert_eq!(aqi_label(0), "Unknown");
    }

    #[test]
    fn test_rank_pollutants_worst_first() {
        let components = AirComponents {
            co: 230.0,
            no: 0.0,
            no2: 100.0,
            o3: 10.0,
            so2: 1.0,
            pm2_5: 40.0,
            pm10: 10.0,
            nh3: 0.5,
        };
        let ranked = rank_pollutants(&components);
        assert_eq!(ranked.len(), 8);
        assert_eq!(ranked[0].2, PollutantLevel::Moderate);
        assert!(ranked.iter().any(|(p, _, _)| *p == Pollutant::No2));
        assert_eq!(ranked.last().map(|r| r.2), Some(PollutantLevel::Excellent));
    }
}
