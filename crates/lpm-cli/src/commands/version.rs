use lpm_core::VERSION;
use miette::Result;

pub fn run(json: bool) -> Result<()> {
    if json {
        super::print_json(&serde_json::json!({ "ok": true, "version": VERSION }));
    } else {
        println!("lpm {VERSION}");
    }
    Ok(())
}
