//! One-shot key operations.

use confwatch::{ConfResult, EtcdConfig};

use crate::cli::args::{AddArgs, CasArgs, GetArgs, MkdirArgs, RmArgs, SetArgs};

pub async fn get(client: &EtcdConfig, args: GetArgs) -> ConfResult<()> {
    let (value, index) = client.get_with_index(&args.key).await?;
    if args.index {
        println!("{value}\t{index}");
    } else {
        println!("{value}");
    }
    Ok(())
}

pub async fn set(client: &EtcdConfig, args: SetArgs) -> ConfResult<()> {
    let (value, index) = client.set_with_index(&args.key, &args.value).await?;
    println!("{value}\t{index}");
    Ok(())
}

pub async fn cas(client: &EtcdConfig, args: CasArgs) -> ConfResult<()> {
    let (value, index) = client
        .compare_and_swap(&args.key, &args.value, args.index)
        .await?;
    println!("{value}\t{index}");
    Ok(())
}

pub async fn mkdir(client: &EtcdConfig, args: MkdirArgs) -> ConfResult<()> {
    client.mkdir(&args.path).await
}

pub async fn add(client: &EtcdConfig, args: AddArgs) -> ConfResult<()> {
    let value = client.add(&args.dir, &args.value).await?;
    println!("{value}");
    Ok(())
}

pub async fn rm(client: &EtcdConfig, args: RmArgs) -> ConfResult<()> {
    client.delete(&args.key).await
}
