use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PaceError, Result};

/// Highest single downforce level. Levels above this up to
/// `MAX_COMBINED_LEVEL` are bands spanning two adjacent base levels.
pub const MAX_BASE_LEVEL: u8 = 5;
pub const MAX_COMBINED_LEVEL: u8 = 9;

/// Static lookup tables for one season: who drives for whom, which venues
/// run, which of them host a sprint and how much downforce each one needs.
///
/// Built once and passed by reference into the pipeline. Each driver code
/// belongs to exactly one team for the whole run.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    rosters: Vec<(String, Vec<String>)>,
    driver_team: BTreeMap<String, String>,
    driver_names: BTreeMap<String, String>,
    events: Vec<String>,
    sprints: BTreeSet<String>,
    downforce: BTreeMap<u8, BTreeSet<String>>,
}

impl ReferenceData {
    pub fn new(
        constructors: &[(&str, &[&str])],
        driver_names: &[(&str, &str)],
        events: &[(&str, u8)],
        sprints: &[&str],
    ) -> Result<Self> {
        let mut driver_team = BTreeMap::new();
        for (team, drivers) in constructors {
            for driver in drivers.iter() {
                if driver_team.insert(driver.to_string(), team.to_string()).is_some() {
                    return Err(PaceError::InvalidReference(format!(
                        "driver {driver} is mapped to more than one team"
                    )));
                }
            }
        }

        let mut downforce: BTreeMap<u8, BTreeSet<String>> = BTreeMap::new();
        for (event, level) in events {
            if !(1..=MAX_BASE_LEVEL).contains(level) {
                return Err(PaceError::InvalidReference(format!(
                    "{event} has downforce level {level}, expected 1..={MAX_BASE_LEVEL}"
                )));
            }
            downforce.entry(*level).or_default().insert(event.to_string());
        }

        let event_names: Vec<String> = events.iter().map(|(e, _)| e.to_string()).collect();
        for sprint in sprints {
            if !event_names.iter().any(|e| e == sprint) {
                return Err(PaceError::InvalidReference(format!(
                    "sprint venue {sprint} is not on the calendar"
                )));
            }
        }

        Ok(Self {
            rosters: constructors
                .iter()
                .map(|(t, drivers)| (t.to_string(), drivers.iter().map(|d| d.to_string()).collect()))
                .collect(),
            driver_team,
            driver_names: driver_names
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
            events: event_names,
            sprints: sprints.iter().map(|s| s.to_string()).collect(),
            downforce,
        })
    }

    /// The 2023 calendar, grid and downforce ratings.
    pub fn season_2023() -> Result<Self> {
        Self::new(CONSTRUCTORS_2023, DRIVERS_2023, EVENTS_2023, SPRINTS_2023)
    }

    pub fn team_of(&self, driver: &str) -> Result<&str> {
        self.driver_team
            .get(driver)
            .map(String::as_str)
            .ok_or_else(|| PaceError::UnknownIdentity(format!("driver {driver}")))
    }

    pub fn driver_name(&self, driver: &str) -> Option<&str> {
        self.driver_names.get(driver).map(String::as_str)
    }

    /// Driver codes in team order, then in the order listed for each team.
    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.rosters
            .iter()
            .flat_map(|(_, drivers)| drivers.iter().map(String::as_str))
    }

    pub fn teams(&self) -> impl Iterator<Item = &str> {
        self.rosters.iter().map(|(team, _)| team.as_str())
    }

    /// Calendar in season order.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(String::as_str)
    }

    pub fn has_sprint(&self, event: &str) -> bool {
        self.sprints.contains(event)
    }

    pub fn downforce_of(&self, event: &str) -> Option<u8> {
        self.downforce
            .iter()
            .find(|(_, events)| events.contains(event))
            .map(|(level, _)| *level)
    }

    /// Events registered under `level`. Levels 6..=9 are the union of the
    /// two adjacent base levels `level - 5` and `level - 4`.
    pub fn events_at_downforce(&self, level: u8) -> Result<BTreeSet<&str>> {
        let base_levels = match level {
            1..=MAX_BASE_LEVEL => vec![level],
            6..=MAX_COMBINED_LEVEL => vec![level - MAX_BASE_LEVEL, level - MAX_BASE_LEVEL + 1],
            _ => {
                return Err(PaceError::InvalidReference(format!(
                    "downforce level {level}"
                )))
            }
        };

        Ok(base_levels
            .iter()
            .filter_map(|l| self.downforce.get(l))
            .flatten()
            .map(String::as_str)
            .collect())
    }
}

const CONSTRUCTORS_2023: &[(&str, &[&str])] = &[
    ("Red Bull Racing", &["VER", "PER"]),
    ("Aston Martin", &["ALO", "STR"]),
    ("Mercedes", &["HAM", "RUS"]),
    ("Ferrari", &["LEC", "SAI"]),
    ("Alfa Romeo", &["BOT", "ZHO"]),
    ("Alpine", &["GAS", "OCO"]),
    ("Williams", &["ALB", "SAR"]),
    ("AlphaTauri", &["DEV", "TSU", "RIC", "LAW"]),
    ("Haas F1 Team", &["HUL", "MAG"]),
    ("McLaren", &["NOR", "PIA"]),
];

const DRIVERS_2023: &[(&str, &str)] = &[
    ("VER", "Verstappen"),
    ("PER", "Perez"),
    ("LEC", "Leclerc"),
    ("SAI", "Sainz"),
    ("ALO", "Alonso"),
    ("HAM", "Hamilton"),
    ("RUS", "Russell"),
    ("OCO", "Ocon"),
    ("STR", "Stroll"),
    ("NOR", "Norris"),
    ("GAS", "Gasly"),
    ("HUL", "Hulkenberg"),
    ("ZHO", "Zhou"),
    ("MAG", "Magnussen"),
    ("BOT", "Bottas"),
    ("ALB", "Albon"),
    ("PIA", "Piastri"),
    ("TSU", "Tsunoda"),
    ("DEV", "De Vries"),
    ("SAR", "Sargeant"),
    ("RIC", "Ricciardo"),
    ("LAW", "Lawson"),
];

const EVENTS_2023: &[(&str, u8)] = &[
    ("Sakhir", 3),
    ("Jeddah", 2),
    ("Melbourne", 4),
    ("Baku", 1),
    ("Miami", 2),
    ("Monaco", 5),
    ("Barcelona", 4),
    ("Montréal", 2),
    ("Spielberg", 3),
    ("Silverstone", 4),
    ("Budapest", 5),
    ("Spa-Francorchamps", 2),
    ("Zandvoort", 4),
    ("Monza", 1),
    ("Marina Bay", 5),
    ("Suzuka", 4),
    ("Lusail", 4),
    ("Austin", 3),
    ("Mexico City", 5),
    ("São Paulo", 4),
    ("Las Vegas", 1),
    ("Yas Island", 3),
];

const SPRINTS_2023: &[&str] = &[
    "Baku",
    "Spielberg",
    "Spa-Francorchamps",
    "Lusail",
    "Austin",
    "São Paulo",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_lookup() {
        let reference = ReferenceData::season_2023().unwrap();
        assert_eq!(reference.team_of("VER").unwrap(), "Red Bull Racing");
        assert_eq!(reference.team_of("RIC").unwrap(), "AlphaTauri");
        assert_eq!(reference.driver_name("HUL"), Some("Hulkenberg"));
        assert!(matches!(
            reference.team_of("XXX"),
            Err(PaceError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_calendar_order_and_sprints() {
        let reference = ReferenceData::season_2023().unwrap();
        let events: Vec<&str> = reference.events().collect();
        assert_eq!(events.len(), 22);
        assert_eq!(events[0], "Sakhir");
        assert_eq!(events[21], "Yas Island");
        assert!(reference.has_sprint("Baku"));
        assert!(!reference.has_sprint("Monaco"));
        assert_eq!(reference.downforce_of("Monza"), Some(1));
    }

    #[test]
    fn test_base_downforce_levels() {
        let reference = ReferenceData::season_2023().unwrap();
        let low: Vec<&str> = reference.events_at_downforce(1).unwrap().into_iter().collect();
        assert_eq!(low, vec!["Baku", "Las Vegas", "Monza"]);
        assert_eq!(reference.events_at_downforce(5).unwrap().len(), 4);
    }

    #[test]
    fn test_combined_bands_are_unions() {
        let reference = ReferenceData::season_2023().unwrap();
        for band in 6..=MAX_COMBINED_LEVEL {
            let lower = reference.events_at_downforce(band - 5).unwrap();
            let upper = reference.events_at_downforce(band - 4).unwrap();
            let combined = reference.events_at_downforce(band).unwrap();
            let union: BTreeSet<&str> = lower.union(&upper).copied().collect();
            assert_eq!(combined, union, "band {band}");
        }
        assert_eq!(reference.events_at_downforce(7).unwrap().len(), 8);
    }

    #[test]
    fn test_invalid_downforce_level() {
        let reference = ReferenceData::season_2023().unwrap();
        assert!(matches!(
            reference.events_at_downforce(0),
            Err(PaceError::InvalidReference(_))
        ));
        assert!(matches!(
            reference.events_at_downforce(10),
            Err(PaceError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_duplicate_driver_rejected() {
        let result = ReferenceData::new(
            &[("A", &["AAA"]), ("B", &["AAA"])],
            &[],
            &[("X", 1)],
            &[],
        );
        assert!(matches!(result, Err(PaceError::InvalidReference(_))));
    }

    #[test]
    fn test_sprint_off_calendar_rejected() {
        let result = ReferenceData::new(&[("A", &["AAA"])], &[], &[("X", 1)], &["Y"]);
        assert!(matches!(result, Err(PaceError::InvalidReference(_))));

        let result = ReferenceData::new(&[("A", &["AAA"])], &[], &[("X", 6)], &[]);
        assert!(matches!(result, Err(PaceError::InvalidReference(_))));
    }
}
