/// Minimal stub for a reels-tray story; only the id is exposed.
#[derive(Debug)]
pub struct Story {
    pub id: String,
}

impl Story {
    pub fn new(id: String) -> Self {
        Self { id }
    }
}
