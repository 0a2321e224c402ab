//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "binary"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Build metadata for the cluster version operator daemon."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // no fail_on_error: source tarballs have no git metadata and still build
    EmitBuilder::builder()
        .build_timestamp()
        .all_cargo()
        .all_git()
        .emit()?;
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
