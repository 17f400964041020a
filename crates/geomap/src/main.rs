//! geomap binary entry point; see the library crate for details.

#[tokio::main]
async fn main() {
    if let Err(e) = lib_geomap::init().await {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}
