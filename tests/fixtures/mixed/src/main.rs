mod store;

use store::Store;

fn main() {
    let store = Store::new();
    store.save();
}
