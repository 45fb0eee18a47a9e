use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let Ok(crate_dir) = env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };

    let header = PathBuf::from(out_dir).join("tether.h");
    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("TETHER_H")
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&header);
        }
        // A header failure must not break the library build.
        Err(e) => println!("cargo:warning=cbindgen could not generate tether.h: {e}"),
    }
}
