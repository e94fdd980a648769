//! Fixed capacity list and dictionary drawing their nodes from the hook.

use blockpool::{Dictionary, List, hook};

fn main() -> blockpool::Result<()> {
    pretty_env_logger::init();

    hook::install_system_handlers();

    let mut queue = List::new(4)?;
    for job in ["fetch", "parse", "store"] {
        queue.push_back(job)?;
    }
    queue.push_front("connect")?;

    if let Err(error) = queue.push_back("overflow") {
        println!("Queue refused a job: {error}");
    }

    let mut cursor = queue.cursor_front_mut();
    while let Some(job) = cursor.current() {
        if *job == "parse" {
            cursor.remove_current();
            cursor.insert_before("validate")?;
            break;
        }
        cursor.move_next();
    }
    println!("Queue: {queue:?}");

    let mut ports = Dictionary::new(3)?;
    ports.insert("ssh", 22)?;
    ports.insert("http", 80)?;
    ports.insert("https", 443)?;
    println!("Inserting ssh again: {}", ports.insert("ssh", 2222)?);

    for (name, port) in &ports {
        println!("{name:>6} -> {port}");
    }
    println!("Tree depth {} for {} entries", ports.depth(), ports.len());

    let mut more = Dictionary::new(4)?;
    more.insert("dns", 53)?;
    more.merge(&ports)?;
    println!("Merged: {more:?}");

    Ok(())
}
