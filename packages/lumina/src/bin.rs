
#[macro_use]
extern crate tracing;

use lumina::{
    HeadlessDevice,
    Pipeline,
    ShaderContext,
};
use std::{
    env,
    fs,
};
use anyhow::{
    Context,
    Result,
    bail,
};
use tracing_subscriber::{
    EnvFilter,
    FmtSubscriber,
};


fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let Some(path) = env::args().nth(1) else {
        bail!("usage: lumina <shader-file>");
    };
    info!(%path, "compiling dialect source");

    let code = fs::read_to_string(&path)
        .with_context(|| format!("failed to read [{}]", path))?;

    let mut context = ShaderContext::new();
    let mut device = HeadlessDevice::new();
    let mut pipeline = Pipeline::new(&mut context, &code)?;
    pipeline.activate(&mut context, &mut device)?;

    println!("== vertex stage ==");
    println!("{}", pipeline.vertex_source());
    println!("== fragment stage ==");
    println!("{}", pipeline.fragment_source());

    let storage = pipeline.storage_layout();
    println!("== storage layout ==");
    println!("stride: {} bytes", storage.stride);
    for element in &storage.elements {
        println!(
            "location {}: {} x {:?} at offset {}",
            element.location, element.nb_element, element.scalar, element.offset,
        );
    }

    Ok(())
}
