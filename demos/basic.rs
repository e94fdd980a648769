//! Installs the system handlers on the hook and walks through the raw layers:
//! a block pool, an object pool and a value constructed straight in hook memory.
//!
//! Run with `RUST_LOG=debug` to see the pools being set up.

use blockpool::{FixedSizeBlocks, HookBox, ObjectPool, construct, destroy, hook};

fn main() {
    pretty_env_logger::init();

    hook::install_system_handlers();

    let mut blocks = FixedSizeBlocks::new(24, 4);
    println!("{blocks:?}");

    let a = blocks.allocate().expect("block");
    let b = blocks.allocate().expect("block");
    println!("Blocks at {a:p} and {b:p}, {} left", blocks.available());

    unsafe { blocks.deallocate(b) };
    let c = blocks.allocate().expect("block");
    println!("Freed {b:p}, next allocation got {c:p} back");

    let mut points: ObjectPool<(f64, f64)> = ObjectPool::new(2);
    let p = points.construct((1.5, -2.0)).expect("point");
    let q = points.construct((0.0, 4.0)).expect("point");
    println!("Point pool full: {}", points.construct((9.0, 9.0)).is_none());
    unsafe {
        println!("Points {:?} and {:?}", *p.as_ptr(), *q.as_ptr());
        points.destroy(p);
        points.destroy(q);
    }

    let mut greeting = construct(String::from("hello from hook memory"));
    if let Some(text) = greeting {
        println!("{}", unsafe { text.as_ref() });
    }
    unsafe { destroy(&mut greeting) };

    let boxed = HookBox::new(vec![1u8, 2, 3]).expect("hook memory");
    println!("Boxed {boxed:?}");
}
