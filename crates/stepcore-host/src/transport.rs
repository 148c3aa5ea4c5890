use stepcore::{Command, CommandSink};

/// Stands in for the named external collaborator `transport.send_batch`
/// (spec.md §1/§6): the core hands it an ordered command stream and
/// never touches those commands again. This implementation logs each
/// command at the host boundary and keeps a copy for the `replay`
/// subcommand to print, rather than encoding and shipping it over a
/// serial link.
#[derive(Default, Debug)]
pub struct LoggingTransport {
    pub commands: Vec<Command>,
}

impl CommandSink for LoggingTransport {
    fn push(&mut self, command: Command) {
        match &command {
            Command::QueueStep(step) => tracing::debug!(
                oid = step.oid,
                interval = step.interval,
                count = step.count,
                add = step.add,
                req_clock = step.req_clock,
                min_clock = step.min_clock,
                "queue_step"
            ),
            Command::SetNextStepDir(dir) => tracing::debug!(
                oid = dir.oid,
                dir = dir.dir,
                req_clock = dir.req_clock,
                "set_next_step_dir"
            ),
            Command::Raw(msg) => tracing::debug!(
                len = msg.data.len(),
                req_clock = msg.req_clock,
                "raw_message"
            ),
        }
        self.commands.push(command);
    }
}
