use depspec::{DeferredReference, DependencyKind, Resolver, Setting};

depspec::declare_schema!(toml = r#"
[project]
name = "inventory"
revision = "1.0"

[kinds.QUEUE]
url = "string"
fifo = "boolean"

[kinds.QUEUE.deadLetter]
url = "string"
maxReceives = "number"

[settings]
subnetIds = "string_list"
dependencySecretNamePrefix = "string"
"#);

use dependencies::{Queue, QueueDeadLetter};
use settings::SubnetIds;

fn lookups(resolver: &Resolver) -> depspec::Result<()> {
    let queue = resolver.dependency::<Queue>("orders")?;
    let _: DeferredReference<String> = queue.url();
    let _: DeferredReference<bool> = queue.fifo();
    let _: DeferredReference<f64> = queue.dead_letter().max_receives();
    let _: DeferredReference<QueueDeadLetter> = queue.dead_letter().reference();
    let _: DeferredReference<Vec<String>> = resolver.setting::<SubnetIds>()?;
    Ok(())
}

fn main() {
    assert_eq!(<Queue as DependencyKind>::NAME, "QUEUE");
    assert_eq!(<SubnetIds as Setting>::NAME, "subnetIds");
    let _ = lookups;
}
