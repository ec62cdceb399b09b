//! The fixed location catalog.

/// Every location a round can be set in. Sent to all players, spies
/// included, so they can reason about the others' questions.
pub const LOCATIONS: [&str; 12] = [
    "Beach",
    "Restaurant",
    "Airport",
    "Bank",
    "School",
    "Hospital",
    "Casino",
    "Space Station",
    "Submarine",
    "Movie Studio",
    "Police Station",
    "Supermarket",
];

/// What a spy is told instead of the location.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// The catalog as owned strings, ready for a `gameStarted` payload.
pub fn all_locations() -> Vec<String> {
    LOCATIONS.iter().map(|l| l.to_string()).collect()
}
