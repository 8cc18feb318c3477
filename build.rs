use std::{env, fs, path::PathBuf};

// Ship the default settings next to the binary (target/<profile>/settings.json).
fn main() {
    println!("cargo:rerun-if-changed=settings.json");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let profile_dir = out_dir
        .ancestors()
        .nth(3)
        .unwrap();

    fs::copy("settings.json", profile_dir.join("settings.json"))
        .expect("Failed to copy settings.json into the profile directory");
}
