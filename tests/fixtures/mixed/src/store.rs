pub struct Store {
    entries: Vec<String>,
}

impl Store {
    pub fn new() -> Self {
        Store { entries: Vec::new() }
    }

    pub fn save(&self) {
        log_save(self.entries.len());
    }
}

fn log_save(count: usize) {
    println!("saved {count}");
}

fn legacy_flush() {}
