//! Command dispatch: build the engine, run the requested operation,
//! print a human-readable result.

use std::collections::BTreeSet;

use anyhow::Result;
use lab_config::LabConfig;
use lab_orchestrator::{GroupId, InstantiateRequest, LabEngine, MemberFailure};
use lab_platform::{get_gateway, PowerState};

use crate::cli::{Args, Command, LabCommand, TemplateCommand, VmCommand};

pub async fn execute_command(args: Args) -> Result<()> {
    let config = LabConfig::load(args.config.as_deref())?;
    config.validate()?;
    let gateway = get_gateway(&config.platform)?;
    let engine = LabEngine::new(gateway, &config.tunables);

    match args.command {
        Command::Template {
            command: TemplateCommand::Tag { vmid, groups },
        } => {
            engine.tag_template(vmid, &groups).await?;
            if groups.is_empty() {
                println!("Cleared lab-group tags on template {vmid}");
            } else {
                println!(
                    "Tagged template {vmid} with lab groups [{}]",
                    groups.join(",")
                );
            }
        }

        Command::Lab { command } => run_lab_command(&engine, command).await?,

        Command::Vm {
            command: VmCommand::List,
        } => {
            let inventory = engine.inventory().await?;
            println!(
                "{:<8} {:<28} {:<10} {:<10} {:<16}",
                "VMID", "NAME", "STATUS", "NODE", "LAB"
            );
            for vm in &inventory.vms {
                let lab = match (&vm.tags.lab_name, vm.tags.instance) {
                    (Some(name), Some(instance)) => format!("{name}_cloned{instance}"),
                    _ if vm.template && !vm.tags.lab_groups.is_empty() => {
                        format!("[{}]", vm.tags.lab_groups.join(","))
                    }
                    _ => "-".to_string(),
                };
                let status = if vm.template {
                    "template".to_string()
                } else {
                    vm.power.to_string()
                };
                println!(
                    "{:<8} {:<28} {:<10} {:<10} {:<16}",
                    vm.vmid, vm.name, status, vm.node, lab
                );
            }
        }
    }
    Ok(())
}

async fn run_lab_command(engine: &LabEngine, command: LabCommand) -> Result<()> {
    match command {
        LabCommand::Create {
            lab_group,
            zone,
            tag,
            instance,
        } => {
            let report = engine
                .instantiate(&InstantiateRequest {
                    lab_group,
                    vlan_zone: zone,
                    vlan_tag: tag,
                    instance,
                })
                .await?;
            println!(
                "Lab '{}' instantiated on vnet '{}'",
                report.group, report.vnet
            );
            for vm in &report.created {
                println!("  {:<8} {:<28} ({})", vm.vmid, vm.name, vm.node);
            }
        }

        LabCommand::Reconcile { group, members } => {
            let group: GroupId = group.parse()?;
            let requested: BTreeSet<u32> = members.into_iter().collect();
            let report = engine.reconcile(&group, &requested).await?;
            if report.converged() {
                println!("Group '{}' already converged", report.group);
            } else {
                println!(
                    "Group '{}' reconciled: {} added, {} removed",
                    report.group,
                    report.added.len(),
                    report.removed.len()
                );
            }
            print_failures(&report.failures);
        }

        LabCommand::Start { group } => {
            let group: GroupId = group.parse()?;
            let report = engine.set_power(&group, PowerState::Running).await?;
            println!(
                "Start issued to {} VM(s) in '{}'",
                report.commanded.len(),
                report.group
            );
        }

        LabCommand::Stop { group } => {
            let group: GroupId = group.parse()?;
            let report = engine.set_power(&group, PowerState::Stopped).await?;
            println!(
                "Stop issued to {} VM(s) in '{}'",
                report.commanded.len(),
                report.group
            );
        }

        LabCommand::Delete { group } => {
            let group: GroupId = group.parse()?;
            let report = engine.teardown(&group).await?;
            println!(
                "Deleted {} VM(s) from '{}'",
                report.deleted.len(),
                report.group
            );
            match (&report.vnet, report.vnet_deleted) {
                (Some(vnet), true) => println!("Deleted vnet '{vnet}'"),
                (Some(vnet), false) => println!("Vnet '{vnet}' kept (members remain or deletion failed)"),
                (None, _) => {}
            }
            if let Some(error) = &report.vnet_error {
                eprintln!("  vnet deletion failed: {error}");
            }
            print_failures(&report.failures);
        }
    }
    Ok(())
}

fn print_failures(failures: &[MemberFailure]) {
    for failure in failures {
        eprintln!("  VM {} ({}): {}", failure.vmid, failure.node, failure.error);
    }
}
