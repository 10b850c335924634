use crate::domain::board::NewBoard;

const FIXTURE_TITLES: [&str; 6] = [
    "Platform Launch",
    "Marketing Plan",
    "Roadmap",
    "Meetings",
    "Future Ideas",
    "Testing",
];

/// Boards loaded into a freshly reset development store
pub fn seed_boards() -> Vec<NewBoard> {
    FIXTURE_TITLES.iter().map(|title| NewBoard::new(*title)).collect()
}
