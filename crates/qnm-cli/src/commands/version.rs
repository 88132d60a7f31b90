use miette::Result;
use qnm_core::version::version_string;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "ok": true, "version": qnm_core::VERSION })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
