//! Pools can take their region from the kernel instead of the hook.
//! Nothing here installs a hook handler.

use blockpool::{FixedSizeBlocks, List, PageAllocator, PoolConfig, page_size};

fn main() -> blockpool::Result<()> {
    pretty_env_logger::init();

    println!("Page size: {} bytes", page_size());

    let config = PoolConfig::new(48, 64).with_alignment(64);
    let mut blocks = FixedSizeBlocks::from_config(config, PageAllocator);
    println!("{blocks:?}");

    let mut taken = Vec::new();
    while let Some(block) = blocks.allocate() {
        taken.push(block);
    }
    println!("Took {} cache line aligned blocks", taken.len());

    for block in taken {
        unsafe { blocks.deallocate(block) };
    }

    let mut samples = List::new_in(8, PageAllocator)?;
    for sample in [3, 1, 4, 1, 5] {
        samples.push_back(sample)?;
    }
    let copy = samples.try_clone()?;
    println!("Samples {samples:?}, copy equal: {}", samples == copy);

    Ok(())
}
