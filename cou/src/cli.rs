//! All the clap stuff for parsing/documenting the cli

use clap::{ArgAction, Args, Parser, Subcommand};

use cou::config::{self, Config, UpgradeGroup};
use cou::errors::CouResult;

#[derive(Parser, Clone, Debug)]
#[clap(version)]
#[clap(bin_name = "cou")]
/// Plan and run sequenced OpenStack upgrades on a Juju-managed cloud.
///
/// 'cou plan' analyzes the cloud and prints the upgrade plan; 'cou upgrade'
/// executes it, asking for confirmation before each top-level step.
pub struct Cli {
    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,

    /// Raise the console verbosity (repeat up to -vvvv)
    #[clap(short, long, action = ArgAction::Count)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub verbose: u8,

    /// Print errors only
    #[clap(short, long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Analyze the cloud and print the upgrade plan without running anything
    #[clap(disable_version_flag = true)]
    Plan(PlanArgs),
    /// Analyze the cloud, then execute the upgrade plan
    #[clap(disable_version_flag = true)]
    Upgrade(UpgradeArgs),
}

/// Options shared by `plan` and `upgrade`
#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    /// The model to operate on (defaults to the currently selected one)
    #[clap(long, global = true)]
    pub model: Option<String>,

    /// Back up the MySQL databases before upgrading (the default)
    #[clap(long, global = true, overrides_with = "no_backup")]
    pub backup: bool,
    /// Skip the database backup
    #[clap(long, global = true, overrides_with = "backup")]
    pub no_backup: bool,

    /// Archive deleted database rows before upgrading (the default)
    #[clap(long, global = true, overrides_with = "no_archive")]
    pub archive: bool,
    /// Skip the archiving step
    #[clap(long, global = true, overrides_with = "archive")]
    pub no_archive: bool,

    /// Rows per archive-data batch
    #[clap(long, global = true, default_value_t = 1000)]
    pub archive_batch_size: u32,

    /// Purge stale shadow table data before upgrading
    #[clap(long, global = true)]
    pub purge: bool,

    /// Only purge data older than this timestamp
    #[clap(long, global = true, value_name = "YYYY-MM-DD[ HH:mm[:ss]]")]
    pub purge_before_date: Option<String>,

    /// Upgrade hypervisors even when they host running VMs
    #[clap(long, global = true)]
    pub force: bool,

    /// Applications to leave untouched (comma separated; currently only
    /// 'vault' may be skipped)
    #[clap(long, global = true, value_delimiter = ',')]
    pub skip_apps: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub common: CommonArgs,

    /// Restrict the plan to one upgrade group
    #[clap(subcommand)]
    pub group: Option<GroupCommand>,
}

#[derive(Args, Clone, Debug)]
pub struct UpgradeArgs {
    #[clap(flatten)]
    pub common: CommonArgs,

    /// Run without the interactive confirmation gates
    #[clap(long, global = true)]
    pub auto_approve: bool,

    /// Restrict the upgrade to one upgrade group
    #[clap(subcommand)]
    pub group: Option<GroupCommand>,
}

/// The upgrade groups a partial invocation can pick
#[derive(Subcommand, Clone, Debug)]
pub enum GroupCommand {
    /// Control-plane applications only
    ControlPlane,
    /// Data-plane applications only (hypervisors included)
    DataPlane,
    /// Hypervisor machines only
    Hypervisors(HypervisorArgs),
}

#[derive(Args, Clone, Debug)]
pub struct HypervisorArgs {
    /// Restrict to these machine ids (comma separated; conflicts with
    /// --availability-zone)
    #[clap(long = "machine", value_delimiter = ',')]
    pub machines: Vec<String>,

    /// Restrict to these availability zones (comma separated; conflicts with
    /// --machine)
    #[clap(long = "availability-zone", value_delimiter = ',')]
    pub availability_zones: Vec<String>,
}

impl Cli {
    /// Convert the parsed arguments into the library [`Config`][],
    /// validating the combinations clap cannot express.
    pub fn to_config(&self) -> CouResult<Config> {
        let (common, group_cmd, auto_approve) = match &self.command {
            Commands::Plan(args) => (&args.common, &args.group, false),
            Commands::Upgrade(args) => (&args.common, &args.group, args.auto_approve),
        };
        let (group, machines, availability_zones) = match group_cmd {
            None => (UpgradeGroup::Whole, Vec::new(), Vec::new()),
            Some(GroupCommand::ControlPlane) => {
                (UpgradeGroup::ControlPlane, Vec::new(), Vec::new())
            }
            Some(GroupCommand::DataPlane) => (UpgradeGroup::DataPlane, Vec::new(), Vec::new()),
            Some(GroupCommand::Hypervisors(args)) => (
                UpgradeGroup::Hypervisors,
                args.machines.clone(),
                args.availability_zones.clone(),
            ),
        };
        let purge_before = common
            .purge_before_date
            .as_deref()
            .map(config::parse_purge_before)
            .transpose()?;
        let config = Config {
            model: common.model.clone(),
            group,
            backup: !common.no_backup,
            archive: !common.no_archive,
            archive_batch_size: common.archive_batch_size,
            purge: common.purge,
            purge_before,
            force: common.force,
            machines,
            availability_zones,
            skip_apps: common.skip_apps.clone(),
            auto_approve,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_keep_backup_and_archive_on() {
        let cli = Cli::parse_from(["cou", "plan"]);
        let config = cli.to_config().unwrap();
        assert!(config.backup);
        assert!(config.archive);
        assert_eq!(config.archive_batch_size, 1000);
        assert_eq!(config.group, UpgradeGroup::Whole);
        assert!(!config.auto_approve);
    }

    #[test]
    fn no_backup_turns_the_backup_off() {
        let cli = Cli::parse_from(["cou", "plan", "--no-backup"]);
        let config = cli.to_config().unwrap();
        assert!(!config.backup);
        assert!(config.archive);
    }

    #[test]
    fn hypervisors_group_takes_zone_filters() {
        let cli = Cli::parse_from(["cou", "plan", "hypervisors", "--availability-zone", "az-1"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.group, UpgradeGroup::Hypervisors);
        assert_eq!(config.availability_zones, vec!["az-1".to_owned()]);
    }

    #[test]
    fn machine_and_zone_filters_reject_each_other() {
        let cli = Cli::parse_from([
            "cou",
            "plan",
            "hypervisors",
            "--machine",
            "0",
            "--availability-zone",
            "az-1",
        ]);
        assert!(cli.to_config().is_err());
    }

    #[test]
    fn auto_approve_is_an_upgrade_flag() {
        let cli = Cli::parse_from(["cou", "upgrade", "--auto-approve"]);
        let config = cli.to_config().unwrap();
        assert!(config.auto_approve);

        // ... also after a group subcommand, as a global flag
        let cli = Cli::parse_from(["cou", "upgrade", "control-plane", "--auto-approve"]);
        assert!(cli.to_config().unwrap().auto_approve);
    }

    #[test]
    fn skip_apps_split_on_commas() {
        let cli = Cli::parse_from(["cou", "plan", "--skip-apps", "vault"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.skip_apps, vec!["vault".to_owned()]);
    }
}
