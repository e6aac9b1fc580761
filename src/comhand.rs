pub mod comhand {
    use std::collections::BTreeMap;
    use std::fmt::Write as _;

    use thiserror::Error;
    use tracing::info;

    use mpx_core::device::device::DeviceTransport;
    use mpx_core::error::error::KernelError;
    use mpx_core::kernel::kernel::Kernel;
    use mpx_core::pcb::pcb::{Pcb, PcbClass, PcbHandle};

    use crate::programs::programs::{DEMO_ITERATIONS, ENTRY_DEMO};

    pub const DEMO_COUNT: usize = 3;
    pub const DEMO_PRIORITY: i32 = 5;

    #[derive(Debug, Error)]
    pub enum CommandError {
        #[error("unknown command '{0}', try 'help'")]
        UnknownCommand(String),
        #[error("usage: {0}")]
        Usage(&'static str),
        #[error("'{0}' is not a number")]
        BadNumber(String),
        #[error("command '{0}' is already registered")]
        Duplicate(&'static str),
        #[error(transparent)]
        Kernel(#[from] KernelError),
    }

    /// What the command handler does once the reply is printed.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Effect {
        Continue,
        Shutdown,
        /// hold the prompt until these processes have exited.
        AwaitExit(Vec<PcbHandle>),
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Reply {
        pub text: String,
        pub effect: Effect,
    }

    impl Reply {
        pub fn text(text: impl Into<String>) -> Reply {
            Reply {
                text: text.into(),
                effect: Effect::Continue,
            }
        }
    }

    pub type CommandHandler<T> = fn(&CommandTable<T>, &mut Kernel<T>, &[&str]) -> Result<Reply, CommandError>;

    struct Command<T: DeviceTransport> {
        handler: CommandHandler<T>,
        usage: &'static str,
    }

    /// Handlers keyed by command name.
    pub struct CommandTable<T: DeviceTransport> {
        commands: BTreeMap<&'static str, Command<T>>,
    }

    impl<T: DeviceTransport> CommandTable<T> {
        pub fn new() -> CommandTable<T> {
            CommandTable {
                commands: BTreeMap::new(),
            }
        }

        pub fn with_base_commands() -> CommandTable<T> {
            let base: [(&'static str, &'static str, CommandHandler<T>); 5] = [
                ("help", "help [command]", cmd_help),
                ("version", "version", cmd_version),
                ("pcb", PCB_USAGE, cmd_pcb),
                ("load-demo", "load-demo", cmd_load_demo),
                ("shutdown", "shutdown", cmd_shutdown),
            ];
            CommandTable {
                commands: base
                    .into_iter()
                    .map(|(name, usage, handler)| (name, Command { handler, usage }))
                    .collect(),
            }
        }

        pub fn register(&mut self, name: &'static str, usage: &'static str, handler: CommandHandler<T>) -> Result<(), CommandError> {
            if self.commands.contains_key(name) {
                return Err(CommandError::Duplicate(name));
            }
            self.commands.insert(name, Command { handler, usage });
            Ok(())
        }

        pub fn usage(&self, name: &str) -> Option<&'static str> {
            self.commands.get(name).map(|cmd| cmd.usage)
        }

        pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
            self.commands.keys().copied()
        }

        /// run one command line. failures come back as their error text.
        pub fn execute(&self, kernel: &mut Kernel<T>, line: &str) -> Reply {
            let words: Vec<&str> = line.split_whitespace().collect();
            let Some((name, args)) = words.split_first() else {
                return Reply::text("");
            };
            let result = match self.commands.get(*name) {
                Some(cmd) => (cmd.handler)(self, kernel, args),
                None => Err(CommandError::UnknownCommand(name.to_string())),
            };
            result.unwrap_or_else(|err| Reply::text(format!("error: {err}")))
        }
    }

    impl<T: DeviceTransport> Default for CommandTable<T> {
        fn default() -> Self {
            CommandTable::new()
        }
    }

    const PCB_USAGE: &str = "pcb create <name> <user|system> <priority> | pcb delete|block|unblock|suspend|resume|show <name> | pcb priority <name> <priority> | pcb list [all|ready|blocked]";

    fn cmd_help<T: DeviceTransport>(table: &CommandTable<T>, _kernel: &mut Kernel<T>, args: &[&str]) -> Result<Reply, CommandError> {
        if let Some(name) = args.first() {
            return table
                .usage(name)
                .map(|usage| Reply::text(format!("usage: {usage}")))
                .ok_or_else(|| CommandError::UnknownCommand(name.to_string()));
        }
        let mut text = String::from("commands:");
        for name in table.names() {
            let _ = write!(text, " {name}");
        }
        Ok(Reply::text(text))
    }

    fn cmd_version<T: DeviceTransport>(_table: &CommandTable<T>, _kernel: &mut Kernel<T>, _args: &[&str]) -> Result<Reply, CommandError> {
        Ok(Reply::text(format!("MPX version {}", env!("CARGO_PKG_VERSION"))))
    }

    fn cmd_shutdown<T: DeviceTransport>(_table: &CommandTable<T>, _kernel: &mut Kernel<T>, args: &[&str]) -> Result<Reply, CommandError> {
        if !args.is_empty() {
            return Err(CommandError::Usage("shutdown"));
        }
        info!("shutdown requested from the console");
        Ok(Reply {
            text: "shutting down".to_string(),
            effect: Effect::Shutdown,
        })
    }

    fn cmd_load_demo<T: DeviceTransport>(_table: &CommandTable<T>, kernel: &mut Kernel<T>, _args: &[&str]) -> Result<Reply, CommandError> {
        let mut handles = Vec::with_capacity(DEMO_COUNT);
        for n in 1..=DEMO_COUNT {
            let name = format!("demo{n}");
            match kernel.spawn(&name, PcbClass::User, DEMO_PRIORITY, ENTRY_DEMO) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // partial loads are rolled back so a retry starts clean.
                    for handle in &handles {
                        if let Some(name) = kernel.pcb(*handle).map(|pcb| pcb.name().to_string()) {
                            let _ = kernel.delete(&name);
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(Reply {
            text: format!("loaded {DEMO_COUNT} demo processes, {DEMO_ITERATIONS} lines each"),
            effect: Effect::AwaitExit(handles),
        })
    }

    fn cmd_pcb<T: DeviceTransport>(_table: &CommandTable<T>, kernel: &mut Kernel<T>, args: &[&str]) -> Result<Reply, CommandError> {
        let command = PcbCommand::parse(args)?;
        Ok(Reply::text(command.execute(kernel)?))
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum ListFilter {
        All,
        Ready,
        Blocked,
    }

    /// The `pcb` administrative family.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum PcbCommand {
        Create { name: String, class: PcbClass, priority: i32 },
        Delete(String),
        Block(String),
        Unblock(String),
        Suspend(String),
        Resume(String),
        Show(String),
        Priority { name: String, priority: i32 },
        List(ListFilter),
    }

    fn parse_priority(raw: &str) -> Result<i32, CommandError> {
        raw.parse::<i32>()
            .map_err(|_| CommandError::BadNumber(raw.to_string()))
    }

    impl PcbCommand {
        pub fn parse(args: &[&str]) -> Result<PcbCommand, CommandError> {
            let usage = CommandError::Usage(PCB_USAGE);
            let command = match args {
                ["create", name, class, priority] => PcbCommand::Create {
                    name: name.to_string(),
                    class: class.parse()?,
                    priority: parse_priority(priority)?,
                },
                ["delete", name] => PcbCommand::Delete(name.to_string()),
                ["block", name] => PcbCommand::Block(name.to_string()),
                ["unblock", name] => PcbCommand::Unblock(name.to_string()),
                ["suspend", name] => PcbCommand::Suspend(name.to_string()),
                ["resume", name] => PcbCommand::Resume(name.to_string()),
                ["show", name] => PcbCommand::Show(name.to_string()),
                ["priority", name, priority] => PcbCommand::Priority {
                    name: name.to_string(),
                    priority: parse_priority(priority)?,
                },
                ["list"] | ["list", "all"] => PcbCommand::List(ListFilter::All),
                ["list", "ready"] => PcbCommand::List(ListFilter::Ready),
                ["list", "blocked"] => PcbCommand::List(ListFilter::Blocked),
                _ => return Err(usage),
            };
            Ok(command)
        }

        pub fn execute<T: DeviceTransport>(self, kernel: &mut Kernel<T>) -> Result<String, CommandError> {
            let text = match self {
                PcbCommand::Create { name, class, priority } => {
                    let handle = kernel.pcb_setup(&name, class, priority)?;
                    kernel.insert(handle);
                    format!("created {name}")
                }
                PcbCommand::Delete(name) => {
                    kernel.delete(&name)?;
                    format!("deleted {name}")
                }
                PcbCommand::Block(name) => {
                    kernel.block(&name)?;
                    format!("blocked {name}")
                }
                PcbCommand::Unblock(name) => {
                    kernel.unblock(&name)?;
                    format!("unblocked {name}")
                }
                PcbCommand::Suspend(name) => {
                    kernel.suspend(&name)?;
                    format!("suspended {name}")
                }
                PcbCommand::Resume(name) => {
                    kernel.resume(&name)?;
                    format!("resumed {name}")
                }
                PcbCommand::Show(name) => {
                    let handle = kernel.find(&name).ok_or(KernelError::NotFound)?;
                    kernel
                        .pcb(handle)
                        .map(|pcb| pcb.to_string())
                        .ok_or(KernelError::NotFound)?
                }
                PcbCommand::Priority { name, priority } => {
                    kernel.set_priority(&name, priority)?;
                    format!("{name} priority set to {priority}")
                }
                PcbCommand::List(filter) => list(kernel, filter),
            };
            Ok(text)
        }
    }

    fn list<T: DeviceTransport>(kernel: &Kernel<T>, filter: ListFilter) -> String {
        let mut lines = Vec::new();
        if let Some(pcb) = kernel.active_pcb() {
            if filter == ListFilter::All {
                lines.push(pcb.to_string());
            }
        }
        // queue order, which is also scheduling order.
        let registry = kernel.registry();
        let queued: Box<dyn Iterator<Item = (PcbHandle, &Pcb)> + '_> = match filter {
            ListFilter::All => Box::new(registry.queued()),
            ListFilter::Ready => Box::new(registry.ready()),
            ListFilter::Blocked => Box::new(registry.blocked()),
        };
        lines.extend(queued.map(|(_, pcb)| pcb.to_string()));
        if lines.is_empty() {
            return "no processes".to_string();
        }
        lines.join("\n")
    }
}
